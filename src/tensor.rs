use burn::{
    prelude::*,
    tensor::{BasicOps, Element},
};

/// A trait for converting items to tensors
///
/// Implemented for slices of states (anything viewable as `&[f32]`, one row per
/// state) and for slices of action indices
pub trait ToTensor<B: Backend, const D: usize, K: BasicOps<B>> {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, D, K>;
}

impl<B, S> ToTensor<B, 2, Float> for &[S]
where
    B: Backend,
    S: AsRef<[f32]>,
{
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 2, Float> {
        let rows = self.len();
        let cols = self.first().map_or(0, |s| s.as_ref().len());
        let values = self
            .iter()
            .flat_map(|s| s.as_ref().iter().copied())
            .collect::<Vec<_>>();
        debug_assert_eq!(values.len(), rows * cols, "states have equal length");

        Tensor::from_data(Data::new(values, Shape::new([rows, cols])).convert(), device)
    }
}

impl<B: Backend> ToTensor<B, 1, Int> for &[usize] {
    fn to_tensor(self, device: &B::Device) -> Tensor<B, 1, Int> {
        let values = self.iter().map(|&x| x as i64).collect::<Vec<_>>();
        let len = values.len();
        Tensor::from_data(Data::new(values, Shape::new([len])).convert(), device)
    }
}

/// Copy a 2D tensor back into row vectors
pub fn to_rows<B: Backend>(tensor: Tensor<B, 2>) -> Vec<Vec<f32>> {
    let [_, cols] = tensor.dims();
    flatten::<B, 2, f32>(tensor)
        .chunks(cols.max(1))
        .map(<[f32]>::to_vec)
        .collect()
}

fn flatten<B: Backend, const D: usize, E: Element>(tensor: Tensor<B, D>) -> Vec<E> {
    tensor.into_data().convert::<E>().value
}
