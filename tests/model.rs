use burn::{
    backend::{Autodiff, NdArray},
    module::AutodiffModule,
    optim::GradientsParams,
    prelude::*,
    tensor::Distribution,
};
use modulation_classifier::{
    model::{HeadConfig, Model, ModelConfig},
    training::{phase::TrainingPhase, TrainingConfig},
};

type TestBackend = Autodiff<NdArray>;

fn small_head() -> HeadConfig {
    HeadConfig::new().with_hidden_size(16)
}

#[test]
fn output_width_matches_class_count() {
    let device = Default::default();

    for classes in [2, 5] {
        let model = ModelConfig::new(classes, small_head()).init::<TestBackend>(&device);

        assert_eq!(model.num_classes(), classes);
        let logits = model.forward(Tensor::zeros([3, 3, 32, 32], &device));
        assert_eq!(logits.dims(), [3, classes]);
    }
}

fn gradient_count(model: &Model<TestBackend>) -> usize {
    let device = Default::default();
    let images = Tensor::random([2, 3, 32, 32], Distribution::Default, &device);
    let targets = Tensor::<TestBackend, 1, Int>::from_ints([0, 1], &device);

    let output = model.forward_classification_training(images, targets);
    GradientsParams::from_grads(output.loss.backward(), model).len()
}

#[test]
fn gradients_reach_only_the_trainable_tail() {
    let model = ModelConfig::new(3, small_head()).init::<TestBackend>(&Default::default());

    // hidden and output dense layers, weight and bias each
    let head_only = gradient_count(&model);
    assert_eq!(head_only, 4);

    let model = model.with_trainable_backbone_tail(4);
    assert!(gradient_count(&model) > head_only);
}

#[test]
fn training_forwards_leave_frozen_layers_unchanged() {
    let device = Default::default();
    let model = ModelConfig::new(3, small_head()).init::<TestBackend>(&device);
    assert_eq!(model.backbone().trainable_layers(), 0);

    let probe = Tensor::<NdArray, 4>::ones([1, 3, 32, 32], &device);
    let before = model.valid().backbone().forward(probe.clone());

    for _ in 0..5 {
        let _ = model.forward_training(Tensor::random([2, 3, 32, 32], Distribution::Default, &device));
    }

    let after = model.valid().backbone().forward(probe);
    let diff: f32 = (after - before).abs().max().into_scalar();
    assert!(diff < 1e-6, "frozen features moved by {diff}");
}

#[test]
fn phases_toggle_the_trainable_tail() {
    let config = TrainingConfig::new();
    let model = ModelConfig::new(3, small_head()).init::<TestBackend>(&Default::default());

    let model = model.with_trainable_backbone_tail(TrainingPhase::Frozen.trainable_backbone_layers(&config));
    assert_eq!(model.backbone().trainable_layers(), 0);

    let model =
        model.with_trainable_backbone_tail(TrainingPhase::FineTune.trainable_backbone_layers(&config));
    let backbone = model.backbone();
    assert_eq!(backbone.trainable_layers(), 4);
    assert!((0..backbone.num_layers() - 4).all(|layer| !backbone.is_trainable(layer)));
}

#[test]
fn missing_pretrained_weights_fall_back_to_random_init() {
    let device = Default::default();

    let model = ModelConfig::new(2, small_head())
        .init_pretrained::<TestBackend>(None, &device)
        .unwrap();
    assert_eq!(model.backbone().trainable_layers(), 0);

    let result = ModelConfig::new(2, small_head())
        .init_pretrained::<TestBackend>(Some(std::path::Path::new("does/not/exist")), &device);
    assert!(result.is_err());
}
