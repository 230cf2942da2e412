use std::path::Path;

use burn::{
    module::AutodiffModule, prelude::*, record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use nn::PaddingConfig2d;
use tracing::info;

use super::{
    bottleneck::{Bottleneck, BottleneckConfig},
    conv_bn::{ConvBn, ConvBnConfig},
};
use crate::error::{Error, Result};

const BOTTLENECK_SETTINGS: [[usize; 4]; 7] = [
    // t = expansion factor, c = channels, n = blocks, s = stride of the first block
    // t, c, n, s
    [1, 16, 1, 1],
    [6, 24, 2, 2],
    [6, 32, 3, 2],
    [6, 64, 4, 2],
    [6, 96, 3, 1],
    [6, 160, 3, 2],
    [6, 320, 1, 1],
];

#[derive(Module, Debug)]
pub enum FeatureLayer<B: Backend> {
    Conv(ConvBn<B>),
    Bottleneck(Bottleneck<B>),
}

impl<B: Backend> FeatureLayer<B> {
    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        match self {
            FeatureLayer::Conv(conv) => conv.forward(x),
            FeatureLayer::Bottleneck(bottleneck) => bottleneck.forward(x),
        }
    }
}

/// MobileNetV2 feature extractor.
///
/// The first `frozen` layers are not trained. During training they run on the
/// inner backend in inference mode: no gradient reaches their parameters and
/// their batch norms keep the running statistics they were loaded with.
/// Freezing is always a prefix of the layer list.
#[derive(Module, Debug)]
pub struct Backbone<B: Backend> {
    layers: Vec<FeatureLayer<B>>,
    frozen: usize,
}

impl<B: Backend> Backbone<B> {
    /// Inference forward pass through every layer.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.layers.iter().fold(x, |x, layer| layer.forward(x))
    }

    fn split(&self) -> (&[FeatureLayer<B>], &[FeatureLayer<B>]) {
        self.layers.split_at(self.frozen.min(self.layers.len()))
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn trainable_layers(&self) -> usize {
        self.layers.len().saturating_sub(self.frozen)
    }

    pub fn is_trainable(&self, layer: usize) -> bool {
        layer >= self.frozen && layer < self.layers.len()
    }

    pub fn freeze(self) -> Self {
        self.unfreeze_last(0)
    }

    /// Makes only the last `count` layers trainable.
    pub fn unfreeze_last(mut self, count: usize) -> Self {
        self.frozen = self.layers.len().saturating_sub(count);
        self
    }
}

impl<B: AutodiffBackend> Backbone<B> {
    /// Training forward pass. Only the trainable tail is recorded in the
    /// autodiff graph and runs its batch norms in training mode.
    pub fn forward_training(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let (frozen, trainable) = self.split();

        let x = if frozen.is_empty() {
            x
        } else {
            let x = frozen
                .iter()
                .fold(x.inner(), |x, layer| layer.valid().forward(x));
            Tensor::from_inner(x)
        };

        trainable.iter().fold(x, |x, layer| layer.forward(x))
    }
}

#[derive(Config, Debug)]
pub struct BackboneConfig {
    #[config(default = 32)]
    pub stem_channels: usize,

    #[config(default = 1280)]
    pub feature_channels: usize,
}

impl BackboneConfig {
    /// Randomly initialised backbone with every layer trainable.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Backbone<B> {
        let mut layers = vec![FeatureLayer::Conv(
            ConvBnConfig::new([3, self.stem_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
        )];

        let mut channels = self.stem_channels;
        for [t, c, n, s] in BOTTLENECK_SETTINGS {
            for block in 0..n {
                let stride = if block == 0 { s } else { 1 };
                layers.push(FeatureLayer::Bottleneck(
                    BottleneckConfig::new([channels, c], stride, t).init(device),
                ));
                channels = c;
            }
        }

        layers.push(FeatureLayer::Conv(
            ConvBnConfig::new([channels, self.feature_channels], [1, 1]).init(device),
        ));

        Backbone { layers, frozen: 0 }
    }

    /// Backbone initialised from a pretrained record written with
    /// [`CompactRecorder`].
    pub fn init_pretrained<B: Backend>(&self, weights: &Path, device: &B::Device) -> Result<Backbone<B>> {
        let backbone = self
            .init(device)
            .load_file(weights, &CompactRecorder::new(), device)
            .map_err(|err| Error::Checkpoint {
                path: weights.to_path_buf(),
                message: format!("{err:?}"),
            })?;

        info!(weights = %weights.display(), "loaded pretrained backbone");
        Ok(backbone)
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;

    use super::*;

    #[test]
    fn mobilenet_v2_layout() {
        let backbone = BackboneConfig::new().init::<NdArray>(&Default::default());

        // stem + 17 bottlenecks + 1x1 head conv
        assert_eq!(backbone.num_layers(), 19);
        assert_eq!(backbone.trainable_layers(), 19);

        let features = backbone.forward(Tensor::zeros([2, 3, 32, 32], &Default::default()));
        assert_eq!(features.dims(), [2, 1280, 1, 1]);
    }

    #[test]
    fn unfreezing_keeps_a_frozen_prefix() {
        let backbone = BackboneConfig::new()
            .init::<NdArray>(&Default::default())
            .freeze();
        assert_eq!(backbone.trainable_layers(), 0);

        let backbone = backbone.unfreeze_last(4);
        assert_eq!(backbone.trainable_layers(), 4);
        assert!(!backbone.is_trainable(14));
        assert!(backbone.is_trainable(15));
        assert!(backbone.is_trainable(18));
        assert!(!backbone.is_trainable(19));
    }
}
