use rand::{rngs::StdRng, SeedableRng};

use crate::error::{Result, TrainError};
use crate::layers::dense::Layer;
use crate::math::matrix::Matrix;
use crate::network::model::{Mode, Model, ModelState, ParamMut};
use crate::network::spec::NetworkSpec;

/// Point-wise segmentation network: a stack of dense layers applied to the
/// channel vector of every voxel, ending in one logit per class.
#[derive(Debug, Clone)]
pub struct Network {
    pub layers: Vec<Layer>,
    mode: Mode,
}

impl Network {
    /// Builds the layers described by `spec`. Weights are seeded from
    /// `spec.seed` when present.
    pub fn from_spec(spec: &NetworkSpec) -> Result<Network> {
        spec.validate()?;
        let mut rng = match spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let layers = spec
            .layer_shapes()?
            .into_iter()
            .map(|(input_size, size, activation)| Layer::new(input_size, size, activation, &mut rng))
            .collect();
        Ok(Network { layers, mode: Mode::Training })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    fn tensor_names(index: usize) -> (String, String) {
        (format!("layers.{index}.weights"), format!("layers.{index}.biases"))
    }
}

impl Model for Network {
    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
        if mode == Mode::Evaluation {
            self.layers.iter_mut().for_each(Layer::clear_cache);
        }
    }

    fn forward(&mut self, inputs: &Matrix) -> Result<Matrix> {
        let keep_cache = self.mode == Mode::Training;
        let mut current = inputs.clone();
        for layer in &mut self.layers {
            current = layer.feed_from(&current, keep_cache)?;
        }
        Ok(current)
    }

    fn backward(&mut self, grad_output: &Matrix) -> Result<()> {
        if self.mode != Mode::Training {
            return Err(TrainError::model("backward called in evaluation mode"));
        }
        let mut delta = grad_output.clone();
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta)?;
        }
        Ok(())
    }

    fn parameters(&mut self) -> Vec<ParamMut<'_>> {
        let mut params = Vec::with_capacity(self.layers.len() * 2);
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let (w_name, b_name) = Network::tensor_names(i);
            params.push(ParamMut { name: w_name, value: &mut layer.weights, grad: &layer.weights_grad });
            params.push(ParamMut { name: b_name, value: &mut layer.biases, grad: &layer.biases_grad });
        }
        params
    }

    fn zero_grad(&mut self) {
        self.layers.iter_mut().for_each(Layer::zero_grad);
    }

    fn state_dict(&self) -> ModelState {
        let mut state = ModelState::default();
        for (i, layer) in self.layers.iter().enumerate() {
            let (w_name, b_name) = Network::tensor_names(i);
            state.tensors.insert(w_name, layer.weights.clone());
            state.tensors.insert(b_name, layer.biases.clone());
        }
        state
    }

    fn load_state_dict(&mut self, state: &ModelState) -> Result<()> {
        if state.tensors.len() != self.layers.len() * 2 {
            return Err(TrainError::model(format!(
                "state holds {} tensors, network has {}",
                state.tensors.len(),
                self.layers.len() * 2
            )));
        }
        // Check everything before touching any layer.
        for (i, layer) in self.layers.iter().enumerate() {
            let (w_name, b_name) = Network::tensor_names(i);
            for (name, current) in [(&w_name, &layer.weights), (&b_name, &layer.biases)] {
                let saved = state
                    .tensors
                    .get(name)
                    .ok_or_else(|| TrainError::model(format!("state is missing `{name}`")))?;
                if saved.shape() != current.shape() {
                    return Err(TrainError::shape(format!(
                        "`{name}` is {:?} in the state but {:?} in the network",
                        saved.shape(),
                        current.shape()
                    )));
                }
            }
        }
        for (i, layer) in self.layers.iter_mut().enumerate() {
            let (w_name, b_name) = Network::tensor_names(i);
            layer.weights = state.tensors[&w_name].clone();
            layer.biases = state.tensors[&b_name].clone();
        }
        Ok(())
    }
}
