// Tests for forward propagation: output dimensions and basic correctness
// of every layer type driven through a graph.

use approx::assert_relative_eq;
use ffnn::layers::{
    Activation, Convolution, Dropout, FullyConnected, Input, Layer, Output, SparselyConnected,
};
use ffnn::utils::{Initializer, Neuron};
use ffnn::{Graph, LayerId, Shape};
use ndarray::{arr1, arr2};

struct Network {
    graph: Graph,
    input: LayerId,
    layer: LayerId,
    output: LayerId,
}

// Input -> layer -> Output, initialized.
fn network<L: Layer>(input: Input, layer: L) -> Network {
    let mut graph = Graph::new();
    let input = graph.add(input).unwrap();
    let layer = graph.add(layer).unwrap();
    let output = graph.add(Output::new()).unwrap();
    graph.connect(&input, &layer).unwrap();
    graph.connect(&layer, &output).unwrap();
    graph.initialize_all().unwrap();
    Network {
        graph,
        input,
        layer,
        output,
    }
}

impl Network {
    fn run(&mut self, values: &[f32]) -> Vec<f32> {
        self.graph.set_input(&self.input, values).unwrap();
        self.graph.forward_all().unwrap();
        self.graph.output(&self.output).unwrap()
    }
}

// ============================================================================
// FullyConnected
// ============================================================================

mod fully_connected_tests {
    use super::*;

    #[test]
    fn test_forward_computes_affine_map() {
        let mut net = network(Input::new(3), FullyConnected::new(2));
        {
            let fc = net.graph.layer_mut::<FullyConnected>(&net.layer).unwrap();
            fc.weights_mut()
                .assign(&arr2(&[[1.0, 0.0, -1.0], [0.5, 0.5, 0.5]]));
            fc.biases_mut().assign(&arr1(&[0.25, -1.0]));
        }
        let y = net.run(&[2.0, 4.0, 6.0]);
        assert_relative_eq!(y[0], 2.0 - 6.0 + 0.25);
        assert_relative_eq!(y[1], 6.0 - 1.0);
    }

    #[test]
    fn test_forward_is_linear_in_the_input() {
        let layer = FullyConnected::new(4)
            .with_initializers(Initializer::standard_normal(), Initializer::Zeros)
            .with_seed(7);
        let mut net = network(Input::new(5), layer);

        let x1 = [0.3, -1.2, 2.0, 0.0, 0.7];
        let x2 = [1.5, 0.4, -0.6, 2.2, -0.1];
        let sum: Vec<f32> = x1.iter().zip(&x2).map(|(a, b)| a + b).collect();

        let y1 = net.run(&x1);
        let y2 = net.run(&x2);
        let y_sum = net.run(&sum);
        for i in 0..4 {
            assert_relative_eq!(y_sum[i], y1[i] + y2[i], epsilon = 1e-5);
        }
    }

    #[test]
    fn test_output_shape() {
        let net = network(Input::new(784), FullyConnected::new(10));
        let output = net.graph.get(&net.output).unwrap();
        assert_eq!(output.input_shape(), Shape::vector(10));
    }
}

// ============================================================================
// Convolution
// ============================================================================

mod convolution_tests {
    use super::*;

    #[test]
    fn test_output_height_follows_stride() {
        let layer = Convolution::new(Shape::new(64, 1, 1), 4, 1, 1, 3).unwrap();
        assert_eq!(layer.output_shape(), Shape::new(21, 1, 1));

        let layer = Convolution::with_strides(Shape::new(64, 64, 3), (4, 4), 6, (3, 2)).unwrap();
        assert_eq!(layer.output_shape(), Shape::new(21, 31, 6));
    }

    #[test]
    fn test_kernel_larger_than_input_is_rejected() {
        assert!(Convolution::new(Shape::new(3, 3, 1), 4, 1, 1, 1).is_err());
        assert!(Convolution::new(Shape::new(3, 3, 1), 2, 2, 1, 0).is_err());
        assert!(Convolution::new(Shape::new(3, 3, 1), 2, 2, 0, 1).is_err());
    }

    #[test]
    fn test_forward_sums_receptive_fields() {
        let layer = Convolution::new(Shape::new(3, 3, 1), 2, 2, 1, 1)
            .unwrap()
            .with_initializers(Initializer::Constant { value: 1.0 }, Initializer::Zeros);
        let mut net = network(Input::with_shape(Shape::new(3, 3, 1)), layer);

        let y = net.run(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(y, vec![12.0, 16.0, 24.0, 28.0]);
    }

    #[test]
    fn test_each_filter_adds_its_bias() {
        let layer = Convolution::new(Shape::new(2, 2, 2), 2, 2, 2, 1)
            .unwrap()
            .with_initializers(
                Initializer::Constant { value: 0.5 },
                Initializer::Constant { value: 1.0 },
            );
        let mut net = network(Input::with_shape(Shape::new(2, 2, 2)), layer);
        let y = net.run(&[1.0; 8]);
        assert_eq!(y, vec![5.0, 5.0]);
    }

    #[test]
    fn test_flat_input_feeds_fixed_shape() {
        let layer = Convolution::new(Shape::new(4, 4, 1), 2, 2, 3, 2).unwrap();
        let net = network(Input::new(16), layer);
        let output = net.graph.get(&net.output).unwrap();
        assert_eq!(output.input_shape(), Shape::new(2, 2, 3));
    }
}

// ============================================================================
// Activation, Dropout, SparselyConnected
// ============================================================================

mod element_wise_tests {
    use super::*;

    #[test]
    fn test_activation_applies_neuron() {
        let mut net = network(Input::new(3), Activation::new(Neuron::Sigmoid));
        let y = net.run(&[0.0, 100.0, -100.0]);
        assert_relative_eq!(y[0], 0.5);
        assert_relative_eq!(y[1], 1.0);
        assert_relative_eq!(y[2], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_leaky_relu_keeps_negative_slope() {
        let mut net = network(
            Input::new(2),
            Activation::new(Neuron::LeakyRelu { alpha: 0.1 }),
        );
        let y = net.run(&[-2.0, 3.0]);
        assert_relative_eq!(y[0], -0.2);
        assert_relative_eq!(y[1], 3.0);
    }

    #[test]
    fn test_dropout_inference_is_identity() {
        let mut net = network(Input::new(4), Dropout::new(0.5).with_seed(3));
        net.graph
            .layer_mut::<Dropout>(&net.layer)
            .unwrap()
            .set_training(false);
        assert_eq!(net.run(&[1.0, 2.0, 3.0, 4.0]), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_dropout_training_preserves_expectation() {
        let mut net = network(Input::new(1000), Dropout::new(0.25).with_seed(11));
        let y = net.run(&[1.0; 1000]);
        let mean = y.iter().sum::<f32>() / y.len() as f32;
        assert!((mean - 1.0).abs() < 0.1, "mean {}", mean);
    }

    #[test]
    fn test_fully_dense_sparse_layer_matches_weights() {
        let layer = SparselyConnected::new(2, 1.0)
            .with_initializers(Initializer::Constant { value: 2.0 }, Initializer::Zeros);
        let mut net = network(Input::new(3), layer);
        let sparse = net.graph.layer::<SparselyConnected>(&net.layer).unwrap();
        assert_eq!(sparse.connections().len(), 6);
        assert_eq!(net.run(&[1.0, 2.0, 3.0]), vec![12.0, 12.0]);
    }
}
