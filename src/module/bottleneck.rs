use burn::prelude::*;
use nn::PaddingConfig2d;

use super::conv_bn::{ConvBn, ConvBnConfig};

/// MobileNetV2 inverted residual: 1x1 expansion, 3x3 depthwise, 1x1 linear
/// projection, with a skip connection when the shape is preserved.
#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    expand: Option<ConvBn<B>>,
    depthwise: ConvBn<B>,
    project: ConvBn<B>,

    residual: bool,
}

impl<B: Backend> Bottleneck<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let input = x.clone();

        let x = match &self.expand {
            Some(expand) => expand.forward(x),
            None => x,
        };
        let x = self.depthwise.forward(x);
        let x = self.project.forward(x);

        if self.residual {
            input + x
        } else {
            x
        }
    }
}

#[derive(Config, Debug)]
pub struct BottleneckConfig {
    pub channels: [usize; 2],
    pub stride: usize,
    pub expand_ratio: usize,
}

impl BottleneckConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Bottleneck<B> {
        let [input, output] = self.channels;
        let hidden = input * self.expand_ratio;

        let expand = (self.expand_ratio > 1)
            .then(|| ConvBnConfig::new([input, hidden], [1, 1]).init(device));

        Bottleneck {
            expand,
            depthwise: ConvBnConfig::new([hidden, hidden], [3, 3])
                .with_stride([self.stride, self.stride])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_groups(hidden)
                .init(device),
            project: ConvBnConfig::new([hidden, output], [1, 1])
                .with_relu6(false)
                .init(device),
            residual: self.stride == 1 && input == output,
        }
    }
}
