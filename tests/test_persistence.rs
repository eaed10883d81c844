//! Tests for saving and loading layers
//!
//! This file covers:
//! - Round trips that reproduce ids, shapes and parameters bit for bit
//! - Signature checks when loading into the wrong layer type
//! - Reconnecting individually loaded layers through virtual connections
//! - Whole-graph save and load through files

use ffnn::io;
use ffnn::layers::{
    Activation, Convolution, Dropout, FullyConnected, Input, Layer, Output, SparselyConnected,
};
use ffnn::optimizers::GradientDescent;
use ffnn::utils::{Initializer, Neuron};
use ffnn::{Error, Graph, LayerId, Shape};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use tempfile::tempdir;

fn trained_chain() -> (Graph, Vec<LayerId>) {
    let mut graph = Graph::new();
    let input = graph.add(Input::new(3)).unwrap();
    let hidden = graph
        .add(
            FullyConnected::new(4)
                .with_initializers(Initializer::standard_normal(), Initializer::standard_normal())
                .with_seed(17)
                .with_optimizer(Box::new(GradientDescent::new(0.1))),
        )
        .unwrap();
    let squash = graph.add(Activation::new(Neuron::Tanh)).unwrap();
    let output = graph.add(Output::new()).unwrap();
    graph.connect(&input, &hidden).unwrap();
    graph.connect(&hidden, &squash).unwrap();
    graph.connect(&squash, &output).unwrap();
    graph.initialize_all().unwrap();

    for _ in 0..3 {
        graph.set_input(&input, &[0.1, 0.2, 0.3]).unwrap();
        graph.forward_all().unwrap();
        graph.set_target(&output, &[0.5; 4]).unwrap();
        graph.backward_all().unwrap();
        graph.update_all().unwrap();
    }
    (graph, vec![input, hidden, squash, output])
}

fn run(graph: &mut Graph, ids: &[LayerId], x: &[f32]) -> Vec<f32> {
    graph.set_input(&ids[0], x).unwrap();
    graph.forward_all().unwrap();
    graph.output(&ids[ids.len() - 1]).unwrap()
}

// ============================================================================
// Round Trip Tests
// ============================================================================

mod round_trip_tests {
    use super::*;

    #[test]
    fn test_fully_connected_round_trip_is_bit_exact() {
        let (graph, ids) = trained_chain();
        let original = graph.layer::<FullyConnected>(&ids[1]).unwrap();

        let mut buffer = Vec::new();
        io::save(&mut buffer, original).unwrap();
        let mut restored = FullyConnected::default();
        io::load(&mut buffer.as_slice(), &mut restored).unwrap();

        assert_eq!(restored.id(), original.id());
        assert_eq!(restored.input_shape(), original.input_shape());
        assert_eq!(restored.output_shape(), original.output_shape());
        assert!(!restored.setup_required());
        assert!(!restored.is_initialized());
        for (a, b) in original.weights().iter().zip(restored.weights().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        for (a, b) in original.biases().iter().zip(restored.biases().iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_convolution_round_trip() {
        let layer = Convolution::with_strides(Shape::new(6, 5, 2), (3, 2), 4, (1, 2))
            .unwrap()
            .with_seed(4);
        let mut graph = Graph::new();
        let input = graph.add(Input::with_shape(Shape::new(6, 5, 2))).unwrap();
        let conv = graph.add(layer).unwrap();
        graph.connect(&input, &conv).unwrap();
        graph.initialize_all().unwrap();
        let original = graph.layer::<Convolution>(&conv).unwrap();

        let mut buffer = Vec::new();
        io::save(&mut buffer, original).unwrap();
        let mut restored = Convolution::default();
        io::load(&mut buffer.as_slice(), &mut restored).unwrap();

        assert_eq!(restored.geometry(), original.geometry());
        assert_eq!(restored.output_shape(), Shape::new(4, 2, 4));
        assert_eq!(restored.kernels(), original.kernels());
        assert_eq!(restored.biases(), original.biases());
    }

    #[test]
    fn test_parameterless_layers_round_trip() {
        let dropout = Dropout::new(0.3).blind();
        let mut buffer = Vec::new();
        io::save(&mut buffer, &dropout).unwrap();
        let activation = Activation::new(Neuron::LeakyRelu { alpha: 0.2 });
        io::save(&mut buffer, &activation).unwrap();

        let mut reader = buffer.as_slice();
        let mut restored_dropout = Dropout::default();
        io::load(&mut reader, &mut restored_dropout).unwrap();
        let mut restored_activation = Activation::default();
        io::load(&mut reader, &mut restored_activation).unwrap();

        assert_eq!(restored_dropout.drop_rate(), 0.3);
        assert!(restored_dropout.is_blind());
        assert_eq!(restored_activation.neuron(), Neuron::LeakyRelu { alpha: 0.2 });
        assert_eq!(restored_activation.id(), activation.id());
    }

    #[test]
    fn test_sparse_connections_round_trip() {
        let mut graph = Graph::new();
        let input = graph.add(Input::new(6)).unwrap();
        let sparse = graph
            .add(SparselyConnected::new(5, 0.4).with_seed(8))
            .unwrap();
        graph.connect(&input, &sparse).unwrap();
        graph.initialize_all().unwrap();
        let original = graph.layer::<SparselyConnected>(&sparse).unwrap();

        let mut buffer = Vec::new();
        io::save(&mut buffer, original).unwrap();
        let mut restored = SparselyConnected::default();
        io::load(&mut buffer.as_slice(), &mut restored).unwrap();

        assert_eq!(restored.connections(), original.connections());
        assert_eq!(restored.values(), original.values());
        assert_eq!(restored.connection_probability(), 0.4);
    }
}

// ============================================================================
// Signature Tests
// ============================================================================

mod signature_tests {
    use super::*;

    #[test]
    fn test_loading_into_another_type_fails() {
        let layer = FullyConnected::new(2);
        let mut buffer = Vec::new();
        io::save(&mut buffer, &layer).unwrap();

        let mut wrong = Convolution::default();
        match io::load(&mut buffer.as_slice(), &mut wrong) {
            Err(Error::SignatureMismatch { expected, found }) => {
                assert_eq!(expected, "ffnn::Convolution");
                assert_eq!(found, "ffnn::FullyConnected");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_hidden_layers_do_not_load_as_input() {
        let layer = Activation::new(Neuron::Relu);
        let mut buffer = Vec::new();
        io::save(&mut buffer, &layer).unwrap();
        let mut input = Input::default();
        assert!(matches!(
            io::load(&mut buffer.as_slice(), &mut input),
            Err(Error::SignatureMismatch { .. })
        ));
    }

    #[test]
    fn test_truncated_stream_fails() {
        let mut empty: &[u8] = &[];
        let mut layer = Output::default();
        assert!(matches!(
            io::load(&mut empty, &mut layer),
            Err(Error::TruncatedArchive(_))
        ));
    }

    #[test]
    fn test_corrupt_line_fails() {
        let mut reader: &[u8] = b"not json\n";
        let mut layer = Output::default();
        assert!(matches!(
            io::load(&mut reader, &mut layer),
            Err(Error::Json(_))
        ));
    }
}

// ============================================================================
// Virtual Connection Tests
// ============================================================================

mod virtual_connection_tests {
    use super::*;

    fn save_each(graph: &Graph, ids: &[LayerId]) -> Vec<u8> {
        let mut buffer = Vec::new();
        for id in ids {
            io::save(&mut buffer, graph.get(id).unwrap()).unwrap();
        }
        buffer
    }

    fn load_each(buffer: &[u8]) -> Vec<Box<dyn Layer>> {
        let mut reader = buffer;
        let mut layers: Vec<Box<dyn Layer>> = vec![
            Box::new(Input::default()),
            Box::new(FullyConnected::default()),
            Box::new(Activation::default()),
            Box::new(Output::default()),
        ];
        for layer in layers.iter_mut() {
            io::load(&mut reader, layer.as_mut()).unwrap();
        }
        layers
    }

    #[test]
    fn test_loaded_layers_record_virtual_producers() {
        let (graph, ids) = trained_chain();
        let layers = load_each(&save_each(&graph, &ids));

        let prev = layers[1].base().prev();
        assert_eq!(prev.len(), 1);
        assert_eq!(prev[0].id, ids[0]);
        assert!(!prev[0].resolved);
        assert_eq!(layers[1].base().first_unresolved(), Some(&ids[0]));
    }

    #[test]
    fn test_initialize_with_unresolved_connection_fails() {
        let (graph, ids) = trained_chain();
        let mut restored = Graph::new();
        for layer in load_each(&save_each(&graph, &ids)) {
            restored.add_boxed(layer).unwrap();
        }
        restored.initialize(&ids[0]).unwrap();
        assert!(matches!(
            restored.initialize(&ids[1]),
            Err(Error::UnresolvedConnection { .. })
        ));
        assert!(!restored.get(&ids[1]).unwrap().is_initialized());
    }

    #[test]
    fn test_connect_resolves_and_reproduces_output() {
        let (mut graph, ids) = trained_chain();
        let x = [0.7, -0.4, 0.2];
        let expected = run(&mut graph, &ids, &x);

        let mut restored = Graph::new();
        for layer in load_each(&save_each(&graph, &ids)) {
            restored.add_boxed(layer).unwrap();
        }
        for pair in ids.windows(2) {
            restored.connect(&pair[0], &pair[1]).unwrap();
        }
        for id in &ids {
            assert!(restored.get(id).unwrap().base().first_unresolved().is_none());
        }
        restored.initialize_all().unwrap();
        assert_eq!(run(&mut restored, &ids, &x), expected);
    }

    #[test]
    fn test_resolve_connections_reports_missing_producer() {
        let (graph, ids) = trained_chain();
        let mut restored = Graph::new();
        // Leave the input layer out.
        for layer in load_each(&save_each(&graph, &ids)).into_iter().skip(1) {
            restored.add_boxed(layer).unwrap();
        }
        match restored.resolve_connections() {
            Err(Error::UnresolvedConnection { from, to }) => {
                assert_eq!(from, ids[0]);
                assert_eq!(to, ids[1]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_repeated_connect_between_loaded_layers_is_harmless() {
        let (graph, ids) = trained_chain();
        let mut restored = Graph::new();
        for layer in load_each(&save_each(&graph, &ids)) {
            restored.add_boxed(layer).unwrap();
        }
        restored.connect(&ids[0], &ids[1]).unwrap();
        restored.connect(&ids[0], &ids[1]).unwrap();
        assert_eq!(restored.get(&ids[1]).unwrap().base().prev().len(), 1);
    }

    #[test]
    fn test_fresh_layers_may_not_repeat_an_edge() {
        let mut graph = Graph::new();
        let input = graph.add(Input::new(2)).unwrap();
        let output = graph.add(Output::new()).unwrap();
        graph.connect(&input, &output).unwrap();
        assert!(matches!(
            graph.connect(&input, &output),
            Err(Error::UnexpectedVirtualConnection { .. })
        ));
    }
}

// ============================================================================
// Whole Graph Tests
// ============================================================================

mod graph_file_tests {
    use super::*;

    #[test]
    fn test_graph_survives_a_file_round_trip() {
        let (mut graph, ids) = trained_chain();
        let x = [0.3, 0.3, -0.9];
        let expected = run(&mut graph, &ids, &x);

        let dir = tempdir().unwrap();
        let path = dir.path().join("network.jsonl");
        {
            let mut writer = BufWriter::new(File::create(&path).unwrap());
            graph.save(&mut writer).unwrap();
        }

        let mut reader = BufReader::new(File::open(&path).unwrap());
        let mut restored = Graph::load(&mut reader).unwrap();
        assert_eq!(restored.len(), ids.len());
        restored
            .set_optimizer(&ids[1], Box::new(GradientDescent::new(0.1)))
            .unwrap();
        restored.initialize_all().unwrap();
        assert_eq!(run(&mut restored, &ids, &x), expected);
    }

    #[test]
    fn test_unknown_signature_is_rejected() {
        let mut reader: &[u8] = b"[{\"signature\":\"other::Layer\"}]\n";
        assert!(matches!(
            Graph::load(&mut reader),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
