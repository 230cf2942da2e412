use std::path::Path;

use burn::{
    prelude::*,
    tensor::{
        activation::{relu, softmax},
        backend::AutodiffBackend,
    },
    train::ClassificationOutput,
};
use nn::{
    loss::CrossEntropyLossConfig,
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    Dropout, DropoutConfig, Linear, LinearConfig,
};
use tracing::warn;

use crate::{
    error::Result,
    module::backbone::{Backbone, BackboneConfig},
};

/// Global average pooling, a ReLU dense layer, dropout, then the class logits.
#[derive(Module, Debug)]
pub struct ClassifierHead<B: Backend> {
    pool: AdaptiveAvgPool2d,
    hidden: Linear<B>,
    dropout: Dropout,
    output: Linear<B>,
}

impl<B: Backend> ClassifierHead<B> {
    pub fn forward(&self, features: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(features);
        let x = x.flatten(1, 3);
        let x = relu(self.hidden.forward(x));
        let x = self.dropout.forward(x);
        self.output.forward(x)
    }
}

#[derive(Config, Debug)]
pub struct HeadConfig {
    #[config(default = 1024)]
    pub hidden_size: usize,

    #[config(default = 0.3)]
    pub dropout: f64,
}

#[derive(Module, Debug)]
pub struct Model<B: Backend> {
    backbone: Backbone<B>,
    head: ClassifierHead<B>,
}

impl<B: Backend> Model<B> {
    /// Class logits, `[batch, classes]`.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward(images);
        self.head.forward(features)
    }

    pub fn forward_probabilities(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn forward_classification(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        classification_output(self.forward(images), targets)
    }

    pub fn num_classes(&self) -> usize {
        self.head.output.weight.val().dims()[1]
    }

    pub fn backbone(&self) -> &Backbone<B> {
        &self.backbone
    }

    /// Leaves only the last `count` backbone layers trainable. The head is
    /// always trainable.
    pub fn with_trainable_backbone_tail(self, count: usize) -> Self {
        Self {
            backbone: self.backbone.unfreeze_last(count),
            head: self.head,
        }
    }
}

impl<B: AutodiffBackend> Model<B> {
    /// Logits for a training step; see [`Backbone::forward_training`].
    pub fn forward_training(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let features = self.backbone.forward_training(images);
        self.head.forward(features)
    }

    pub fn forward_classification_training(
        &self,
        images: Tensor<B, 4>,
        targets: Tensor<B, 1, Int>,
    ) -> ClassificationOutput<B> {
        classification_output(self.forward_training(images), targets)
    }
}

fn classification_output<B: Backend>(
    output: Tensor<B, 2>,
    targets: Tensor<B, 1, Int>,
) -> ClassificationOutput<B> {
    let loss = CrossEntropyLossConfig::new()
        .init(&output.device())
        .forward(output.clone(), targets.clone());

    ClassificationOutput::new(loss, output, targets)
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    pub classes: usize,

    pub head: HeadConfig,

    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,
}

impl ModelConfig {
    /// Assembles the model around a randomly initialised, frozen backbone.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Model<B> {
        self.assemble(self.backbone.init(device), device)
    }

    /// Assembles the model around pretrained backbone weights, frozen.
    pub fn init_pretrained<B: Backend>(
        &self,
        weights: Option<&Path>,
        device: &B::Device,
    ) -> Result<Model<B>> {
        let backbone = match weights {
            Some(weights) => self.backbone.init_pretrained(weights, device)?,
            None => {
                warn!("no pretrained backbone weights given, starting from random initialisation");
                self.backbone.init(device)
            }
        };

        Ok(self.assemble(backbone, device))
    }

    fn assemble<B: Backend>(&self, backbone: Backbone<B>, device: &B::Device) -> Model<B> {
        let head = ClassifierHead {
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            hidden: LinearConfig::new(self.backbone.feature_channels, self.head.hidden_size)
                .init(device),
            dropout: DropoutConfig::new(self.head.dropout).init(),
            output: LinearConfig::new(self.head.hidden_size, self.classes).init(device),
        };

        Model {
            backbone: backbone.freeze(),
            head,
        }
    }
}
