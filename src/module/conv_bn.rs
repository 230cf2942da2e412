use burn::{module::Module, nn::conv::Conv2d, prelude::*, tensor::activation::relu};
use nn::{conv::Conv2dConfig, BatchNorm, BatchNormConfig, PaddingConfig2d};

/// Convolution followed by batch norm and, unless it is a linear projection,
/// a ReLU6.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    relu6: bool,
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);

        if self.relu6 {
            relu(x).clamp_max(6)
        } else {
            x
        }
    }
}

#[derive(Config, Debug)]
pub struct ConvBnConfig {
    channels: [usize; 2],

    kernel_size: [usize; 2],

    #[config(default = "[1, 1]")]
    stride: [usize; 2],

    #[config(default = "PaddingConfig2d::Valid")]
    padding: PaddingConfig2d,

    #[config(default = "1")]
    groups: usize,

    #[config(default = true)]
    relu6: bool,
}

impl ConvBnConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> ConvBn<B> {
        ConvBn {
            conv: Conv2dConfig::new(self.channels, self.kernel_size)
                .with_stride(self.stride)
                .with_padding(self.padding.clone())
                .with_groups(self.groups)
                .with_bias(false)
                .init(device),
            norm: BatchNormConfig::new(self.channels[1]).init(device),
            relu6: self.relu6,
        }
    }
}
