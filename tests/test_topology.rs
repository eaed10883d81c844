//! Tests for graph construction and initialization
//!
//! This file covers:
//! - Connecting and initializing layers in a graph
//! - Input sizes propagated from producers
//! - Fixed input sizes that disagree with the producers
//! - Output buffers aliased onto consumer inputs
//! - Fan-out to several consumers

use ffnn::layers::{Activation, FullyConnected, Input, Layer, Output};
use ffnn::optimizers::GradientDescent;
use ffnn::utils::{Initializer, Neuron};
use ffnn::{Error, Graph, LayerId, Shape};

fn chain(graph: &mut Graph, layers: Vec<Box<dyn Layer>>) -> Vec<LayerId> {
    let ids: Vec<LayerId> = layers
        .into_iter()
        .map(|layer| graph.add_boxed(layer).unwrap())
        .collect();
    for pair in ids.windows(2) {
        graph.connect(&pair[0], &pair[1]).unwrap();
    }
    ids
}

// ============================================================================
// Initialization Tests
// ============================================================================

mod initialization_tests {
    use super::*;

    #[test]
    fn test_every_layer_reports_initialized() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![
                Box::new(Input::new(4)),
                Box::new(FullyConnected::new(3)),
                Box::new(Activation::new(Neuron::Tanh)),
                Box::new(Output::new()),
            ],
        );
        for id in &ids {
            assert!(!graph.get(id).unwrap().is_initialized());
        }
        graph.initialize_all().unwrap();
        for id in &ids {
            assert!(graph.get(id).unwrap().is_initialized());
        }
    }

    #[test]
    fn test_second_initialize_fails_without_side_effects() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![
                Box::new(Input::new(4)),
                Box::new(FullyConnected::new(3)),
                Box::new(Output::new()),
            ],
        );
        graph.initialize_all().unwrap();
        let arena_len = graph.arena().len();
        let region = graph.get(&ids[1]).unwrap().base().input_region();

        for id in &ids {
            assert!(matches!(
                graph.initialize(id),
                Err(Error::AlreadyInitialized(_))
            ));
        }
        assert_eq!(graph.arena().len(), arena_len);
        assert_eq!(graph.get(&ids[1]).unwrap().base().input_region(), region);
        assert!(graph.get(&ids[1]).unwrap().is_initialized());
    }

    #[test]
    fn test_new_edges_to_initialized_layers_are_rejected() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![Box::new(Input::new(2)), Box::new(FullyConnected::new(2))],
        );
        graph.initialize_all().unwrap();
        let late = graph.add(Output::new()).unwrap();
        assert!(matches!(
            graph.connect(&ids[1], &late),
            Err(Error::AlreadyInitialized(id)) if id == ids[1]
        ));
        let source = graph.add(Input::new(1)).unwrap();
        assert!(matches!(
            graph.connect(&source, &ids[1]),
            Err(Error::AlreadyInitialized(id)) if id == ids[1]
        ));
    }
}

// ============================================================================
// Sizing Tests
// ============================================================================

mod sizing_tests {
    use super::*;

    #[test]
    fn test_output_size_is_last_hidden_output() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![
                Box::new(Input::new(10)),
                Box::new(FullyConnected::new(7)),
                Box::new(FullyConnected::new(4)),
                Box::new(Output::new()),
            ],
        );
        graph.initialize_all().unwrap();

        assert_eq!(graph.get(&ids[1]).unwrap().input_shape().size(), Some(10));
        assert_eq!(graph.get(&ids[2]).unwrap().input_shape().size(), Some(7));
        assert_eq!(graph.get(&ids[3]).unwrap().input_shape().size(), Some(4));
        assert_eq!(graph.layer::<FullyConnected>(&ids[2]).unwrap().weights().dim(), (4, 7));
    }

    #[test]
    fn test_single_producer_passes_full_shape() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![
                Box::new(Input::with_shape(Shape::new(4, 3, 2))),
                Box::new(Activation::new(Neuron::Relu)),
                Box::new(Output::new()),
            ],
        );
        graph.initialize_all().unwrap();
        assert_eq!(graph.get(&ids[1]).unwrap().output_shape(), Shape::new(4, 3, 2));
        assert_eq!(graph.get(&ids[2]).unwrap().input_shape(), Shape::new(4, 3, 2));
    }

    #[test]
    fn test_several_producers_sum_their_sizes() {
        let mut graph = Graph::new();
        let a = graph.add(Input::new(3)).unwrap();
        let b = graph.add(Input::with_shape(Shape::new(2, 2, 1))).unwrap();
        let fc = graph.add(FullyConnected::new(1)).unwrap();
        graph.connect(&a, &fc).unwrap();
        graph.connect(&b, &fc).unwrap();

        assert_eq!(graph.evaluate_input_size(&fc).unwrap(), 7);
        assert_eq!(graph.evaluate_input_shape(&fc).unwrap(), Shape::vector(7));
        graph.initialize_all().unwrap();
        assert_eq!(graph.get(&fc).unwrap().input_shape(), Shape::vector(7));
    }

    #[test]
    fn test_mismatched_fixed_output_size_fails() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![
                Box::new(Input::new(4)),
                Box::new(FullyConnected::new(3)),
                Box::new(Output::with_size(5)),
            ],
        );
        graph.initialize(&ids[0]).unwrap();
        graph.initialize(&ids[1]).unwrap();
        match graph.initialize(&ids[2]) {
            Err(Error::InputSizeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 5);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(!graph.get(&ids[2]).unwrap().is_initialized());
    }

    #[test]
    fn test_unresolved_producer_shape_fails() {
        let mut graph = Graph::new();
        let activation = graph.add(Activation::new(Neuron::Relu)).unwrap();
        let output = graph.add(Output::new()).unwrap();
        graph.connect(&activation, &output).unwrap();
        assert!(matches!(
            graph.initialize(&output),
            Err(Error::UnresolvedShape(_))
        ));
    }
}

// ============================================================================
// Aliasing Tests
// ============================================================================

mod aliasing_tests {
    use super::*;

    #[test]
    fn test_producer_output_is_consumer_input() {
        let mut graph = Graph::new();
        let ids = chain(
            &mut graph,
            vec![
                Box::new(Input::new(2)),
                Box::new(FullyConnected::new(3)),
                Box::new(Output::new()),
            ],
        );
        graph.initialize_all().unwrap();

        let fc = graph.layer::<FullyConnected>(&ids[1]).unwrap();
        let output_region = fc.hidden().output_region().unwrap();
        let consumer_input = graph.get(&ids[2]).unwrap().base().input_region().unwrap();
        assert_eq!(output_region, consumer_input);

        graph
            .arena_mut()
            .slice_mut(output_region)
            .unwrap()
            .copy_from_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(graph.output(&ids[2]).unwrap(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_second_producer_maps_at_offset() {
        let mut graph = Graph::new();
        let a = graph.add(Input::new(1)).unwrap();
        let fc_a = graph.add(FullyConnected::new(2)).unwrap();
        let fc_b = graph.add(FullyConnected::new(3)).unwrap();
        let out = graph.add(Output::new()).unwrap();
        graph.connect(&a, &fc_a).unwrap();
        graph.connect(&a, &fc_b).unwrap();
        graph.connect(&fc_a, &out).unwrap();
        graph.connect(&fc_b, &out).unwrap();
        graph.initialize_all().unwrap();

        let consumer_input = graph.get(&out).unwrap().base().input_region().unwrap();
        let first = graph
            .layer::<FullyConnected>(&fc_a)
            .unwrap()
            .hidden()
            .output_region()
            .unwrap();
        let second = graph
            .layer::<FullyConnected>(&fc_b)
            .unwrap()
            .hidden()
            .output_region()
            .unwrap();
        assert_eq!(Some(first), consumer_input.sub(0, 2));
        assert_eq!(Some(second), consumer_input.sub(2, 3));
    }

    #[test]
    fn test_fan_out_mirrors_output_and_sums_errors() {
        let mut graph = Graph::new();
        let input = graph.add(Input::new(2)).unwrap();
        let fc = graph
            .add(
                FullyConnected::new(2)
                    .with_initializers(Initializer::Constant { value: 1.0 }, Initializer::Zeros)
                    .with_optimizer(Box::new(GradientDescent::new(0.1))),
            )
            .unwrap();
        let left = graph.add(Output::new()).unwrap();
        let right = graph.add(Output::new()).unwrap();
        graph.connect(&input, &fc).unwrap();
        graph.connect(&fc, &left).unwrap();
        graph.connect(&fc, &right).unwrap();
        graph.initialize_all().unwrap();

        graph.set_input(&input, &[1.0, 2.0]).unwrap();
        graph.forward_all().unwrap();
        assert_eq!(graph.output(&left).unwrap(), vec![3.0, 3.0]);
        assert_eq!(graph.output(&right).unwrap(), vec![3.0, 3.0]);

        graph.set_target(&left, &[2.0, 3.0]).unwrap();
        graph.set_target(&right, &[3.0, 1.0]).unwrap();
        graph.backward_all().unwrap();

        // Summed forward error is [1, 2]; W is all ones, so Wᵀ·e = [3, 3].
        let error = graph
            .get(&fc)
            .unwrap()
            .base()
            .backward_error_region()
            .unwrap();
        assert_eq!(graph.arena().slice(error).unwrap(), &[3.0, 3.0]);
    }
}
