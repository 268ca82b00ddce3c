//! Neural Network inference.
//!
//! Networks are loaded from ONNX files and run on the CPU with [`tract_onnx`].

mod tensor;

use std::{
    ops::{Index, RangeInclusive},
    path::Path,
    sync::Arc,
};

use anyhow::Context;
use tract_onnx::prelude::{
    Framework, Graph, InferenceModelExt, SimplePlan, TValue, TVec, TypedFact, TypedOp,
};

use crate::image::{Color, Image, Resolution, RotatedRect};

pub use tensor::Tensor;

type Model = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A neural network that can be used for inference.
///
/// This is a cheaply [`Clone`]able handle to the underlying network structures.
#[derive(Clone)]
pub struct NeuralNetwork(Arc<Model>);

impl NeuralNetwork {
    /// Loads a pre-trained model from an ONNX file path.
    ///
    /// The path must have a `.onnx` extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Self::from_path_impl(path.as_ref())
    }

    fn from_path_impl(path: &Path) -> anyhow::Result<Self> {
        match path.extension() {
            Some(ext) if ext == "onnx" => {}
            _ => anyhow::bail!(
                "neural network file '{}' must have `.onnx` extension",
                path.display()
            ),
        }

        let model_data = std::fs::read(path)
            .with_context(|| format!("failed to read network '{}'", path.display()))?;
        let nn = Self::from_onnx(&model_data)
            .with_context(|| format!("failed to load network '{}'", path.display()))?;
        log::debug!(
            "loaded '{}': inputs {:?}, {} outputs",
            path.display(),
            (0..nn.num_inputs())
                .map(|i| nn.input_shape(i))
                .collect::<anyhow::Result<Vec<_>>>()?,
            nn.num_outputs(),
        );
        Ok(nn)
    }

    /// Loads and optimizes a pre-trained model from an in-memory ONNX file.
    ///
    /// Returns an error if the network data is malformed or incomplete, or if the network uses
    /// unimplemented operations.
    pub fn from_onnx(raw: &[u8]) -> anyhow::Result<Self> {
        let graph = tract_onnx::onnx()
            .model_for_read(&mut &*raw)?
            .into_optimized()?;
        let model = SimplePlan::new(graph)?;
        Ok(Self(Arc::new(model)))
    }

    /// Returns the number of input nodes of the network.
    pub fn num_inputs(&self) -> usize {
        self.0.model().inputs.len()
    }

    /// Returns the number of output nodes of the network.
    pub fn num_outputs(&self) -> usize {
        self.0.model().outputs.len()
    }

    /// Returns the tensor shape expected for an input.
    ///
    /// Fails if the network has no input with that index, or if its shape is symbolic.
    pub fn input_shape(&self, index: usize) -> anyhow::Result<Vec<usize>> {
        let fact = self.0.model().input_fact(index)?;
        let shape = fact
            .shape
            .as_concrete()
            .with_context(|| format!("network input {} has a symbolic shape", index))?;
        Ok(shape.to_vec())
    }

    /// Runs the network on a list of input tensors, returning the estimated [`Outputs`].
    #[doc(alias = "infer")]
    pub fn estimate(&self, inputs: &[Tensor]) -> anyhow::Result<Outputs> {
        let inputs = inputs
            .iter()
            .map(|t| Ok(TValue::from_const(Arc::new(t.to_tract()?))))
            .collect::<anyhow::Result<TVec<_>>>()?;
        let outputs = self.0.run(inputs)?;
        let inner = outputs
            .iter()
            .map(|value| Tensor::from_tract(value))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Outputs { inner })
    }
}

/// A convolutional neural network (CNN) that operates on image data.
///
/// The wrapped network must take a single `[1, 3, H, W]` (NCHW) input.
#[derive(Clone)]
pub struct Cnn {
    nn: NeuralNetwork,
    input_res: Resolution,
    color_mapper: ColorMapper,
}

impl Cnn {
    pub fn new(nn: NeuralNetwork, color_mapper: ColorMapper) -> anyhow::Result<Self> {
        let input_res = Self::get_input_res(&nn)?;
        Ok(Self {
            nn,
            input_res,
            color_mapper,
        })
    }

    fn get_input_res(nn: &NeuralNetwork) -> anyhow::Result<Resolution> {
        if nn.num_inputs() != 1 {
            anyhow::bail!(
                "CNN network has to take exactly 1 input, this one takes {}",
                nn.num_inputs(),
            );
        }

        let (w, h) = match nn.input_shape(0)?[..] {
            [1, 3, h, w] => (w, h),
            ref shape => anyhow::bail!("invalid model input shape for NCHW CNN: {:?}", shape),
        };

        Ok(Resolution::new(w.try_into()?, h.try_into()?))
    }

    /// Returns the expected input image size.
    #[inline]
    pub fn input_resolution(&self) -> Resolution {
        self.input_res
    }

    /// Runs the network on the part of `image` covered by `rect`.
    ///
    /// `rect` is stretched to the network's input resolution. A rotated `rect` is sampled along its
    /// own axes, so the network sees its contents upright. Parts of it that lie outside of the
    /// image are filled with black.
    pub fn estimate(
        &self,
        image: &Image,
        rect: impl Into<RotatedRect>,
    ) -> anyhow::Result<Outputs> {
        let tensor = image_to_tensor(image, rect.into(), self.input_res, &self.color_mapper);
        self.nn.estimate(&[tensor])
    }
}

fn image_to_tensor(
    image: &Image,
    rect: RotatedRect,
    res: Resolution,
    mapper: &ColorMapper,
) -> Tensor {
    let (w, h) = (res.width() as usize, res.height() as usize);
    let step_x = rect.rect().width() / w as f32;
    let step_y = rect.rect().height() / h as f32;

    // Sample every pixel once, then lay the channels out as planes.
    let mut rgb = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let (sx, sy) =
                rect.transform_out((x as f32 + 0.5) * step_x, (y as f32 + 0.5) * step_y);
            rgb.push(mapper.map(image.sample(sx, sy)));
        }
    }

    Tensor::from_array_shape_fn([1, 3, h, w], |[_, c, y, x]| rgb[y * w + x][c])
}

/// Maps 8-bit sRGB colors to the value range a network expects.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    target_range: RangeInclusive<f32>,
}

impl ColorMapper {
    /// Creates a simple color mapper that uniformly maps sRGB values to `target_range`.
    ///
    /// This operates on *non-linear* sRGB colors, but maps them linearly to the target range.
    pub fn linear(target_range: RangeInclusive<f32>) -> Self {
        assert!(target_range.end() > target_range.start());
        Self { target_range }
    }

    fn map(&self, color: Color) -> [f32; 3] {
        let start = *self.target_range.start();
        let end = *self.target_range.end();

        let adjust_range = (end - start) / 255.0;
        [color.r(), color.g(), color.b()].map(|col| col as f32 * adjust_range + start)
    }
}

/// The result of a neural network inference pass.
///
/// This is a list of tensors corresponding to the network's output nodes.
#[derive(Debug)]
pub struct Outputs {
    inner: Vec<Tensor>,
}

impl Outputs {
    /// Returns the number of tensors in this inference output.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tensor> {
        self.inner.iter()
    }
}

impl Index<usize> for Outputs {
    type Output = Tensor;

    fn index(&self, index: usize) -> &Tensor {
        &self.inner[index]
    }
}

impl FromIterator<Tensor> for Outputs {
    fn from_iter<T: IntoIterator<Item = Tensor>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f32::consts::FRAC_PI_2;

    use super::*;

    #[test]
    fn color_mapper() {
        let mapper = ColorMapper::linear(-1.0..=1.0);
        assert_eq!(mapper.map(Color::BLACK), [-1.0, -1.0, -1.0]);
        assert_eq!(mapper.map(Color::WHITE), [1.0, 1.0, 1.0]);

        let mapper = ColorMapper::linear(0.0..=1.0);
        assert_eq!(mapper.map(Color::RED), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn tensor_is_nchw() {
        let mut image = Image::new(2, 1);
        image.set(0, 0, Color::RED);
        image.set(1, 0, Color::BLUE);

        let mapper = ColorMapper::linear(0.0..=1.0);
        let tensor = image_to_tensor(&image, image.rect().into(), Resolution::new(2, 1), &mapper);
        assert_eq!(tensor.shape(), &[1, 3, 1, 2]);
        assert_eq!(tensor.index(&[0, 0]), &[1.0, 0.0]);
        assert_eq!(tensor.index(&[0, 1]), &[0.0, 0.0]);
        assert_eq!(tensor.index(&[0, 2]), &[0.0, 1.0]);
    }

    #[test]
    fn letterbox_is_black() {
        let mut image = Image::new(4, 2);
        image.clear(Color::WHITE);

        // Square region covering the whole image, with bars above and below.
        let rect = image.rect().grow_to_fit_aspect(1.0);
        let mapper = ColorMapper::linear(0.0..=1.0);
        let tensor = image_to_tensor(&image, rect.into(), Resolution::new(4, 4), &mapper);
        let red = tensor.index(&[0, 0]);
        assert_eq!(&red[0..4], &[0.0; 4]);
        assert_eq!(&red[4..8], &[1.0; 4]);
        assert_eq!(&red[8..12], &[1.0; 4]);
        assert_eq!(&red[12..16], &[0.0; 4]);
    }

    #[test]
    fn rotated_region_is_sampled_upright() {
        // Right half white: a hand pointing to the right of the frame.
        let mut image = Image::new(4, 4);
        for y in 0..4 {
            for x in 2..4 {
                image.set(x, y, Color::WHITE);
            }
        }

        let rect = RotatedRect::new(image.rect(), FRAC_PI_2);
        let mapper = ColorMapper::linear(0.0..=1.0);
        let tensor = image_to_tensor(&image, rect, Resolution::new(4, 4), &mapper);
        let red = tensor.index(&[0, 0]);
        // The white half ends up at the top of the crop.
        assert_eq!(&red[0..8], &[1.0; 8]);
        assert_eq!(&red[8..16], &[0.0; 8]);
    }

    #[test]
    fn rejects_garbage_model() {
        assert!(NeuralNetwork::from_onnx(b"not a network").is_err());
        let err = NeuralNetwork::from_path("model.tflite").err().unwrap();
        assert!(err.to_string().contains(".onnx"), "{err}");
    }
}
