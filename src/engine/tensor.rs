//! Copying between ndarray buffers and OpenVINO tensors

use anyhow::{Context, Result};
use ndarray::Array4;
use openvino::{ElementType, Shape, Tensor};

/// Build an F32 input tensor with the array's shape
pub fn to_tensor(array: &Array4<f32>) -> Result<Tensor> {
    let dims: Vec<i64> = array.shape().iter().map(|d| *d as i64).collect();
    let shape = Shape::new(&dims)?;
    let mut tensor = Tensor::new(ElementType::F32, &shape)?;

    let data = array
        .as_slice()
        .context("Input array is not contiguous")?;
    unsafe {
        let dst = tensor.get_raw_data_mut()?.as_mut_ptr() as *mut f32;
        std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
    }

    Ok(tensor)
}

/// Read an F32 output tensor into a flat vector
pub fn read_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let len: i64 = tensor.get_shape()?.get_dimensions().iter().product();

    let data = unsafe {
        let ptr = tensor.get_raw_data()?.as_ptr() as *const f32;
        std::slice::from_raw_parts(ptr, len as usize).to_vec()
    };

    Ok(data)
}
