mod common;

use std::fs;

use burn::data::dataset::Dataset;
use modulation_classifier::{
    data::{ModulationDataset, Partitions},
    ClassIndex, Error,
};

#[test]
fn classes_and_images_are_enumerated_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    common::write_partition(dir.path(), "train", &["qpsk", "am", "fm"], 2);

    let classes = ClassIndex::discover(&dir.path().join("train")).unwrap();
    assert_eq!(classes.names(), ["am", "fm", "qpsk"]);

    let dataset = ModulationDataset::load(&dir.path().join("train"), &classes, 16).unwrap();
    assert_eq!(dataset.len(), 6);
    assert_eq!(dataset.labels(), vec![0, 0, 1, 1, 2, 2]);

    let item = dataset.get(0).unwrap();
    assert_eq!(item.image.dimensions(), (16, 16));
}

#[test]
fn non_image_files_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    common::write_partition(dir.path(), "train", &["am"], 2);
    fs::write(dir.path().join("train/am/notes.txt"), "not an image").unwrap();

    let classes = ClassIndex::new(["am"]);
    let dataset = ModulationDataset::load(&dir.path().join("train"), &classes, 8).unwrap();

    assert_eq!(dataset.len(), 2);
}

#[test]
fn missing_partition_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    common::write_partition(dir.path(), "train", &["am", "fm"], 1);
    common::write_partition(dir.path(), "test", &["am", "fm"], 1);

    let result = Partitions::load(dir.path(), 8);

    match result {
        Err(Error::MissingPartition(path)) => assert!(path.ends_with("validation")),
        other => panic!("expected a missing partition, got {:?}", other.err()),
    }
}

#[test]
fn partition_without_images_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("train/am")).unwrap();

    let result = ModulationDataset::load(&dir.path().join("train"), &ClassIndex::new(["am"]), 8);

    assert!(matches!(result, Err(Error::EmptyPartition(_))));
}

#[test]
fn unknown_class_outside_training_set_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    common::write_dataset(dir.path(), &["am", "fm"], 1);
    common::write_partition(dir.path(), "test", &["bpsk"], 1);

    let result = Partitions::load(dir.path(), 8);

    assert!(matches!(
        result,
        Err(Error::UnknownClass { ref class, .. }) if class == "bpsk"
    ));
}

#[test]
fn malformed_image_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("train/am")).unwrap();
    fs::write(dir.path().join("train/am/broken.png"), b"definitely not a png").unwrap();

    let result = ModulationDataset::load(&dir.path().join("train"), &ClassIndex::new(["am"]), 8);

    assert!(matches!(result, Err(Error::Image { .. })));
}

#[test]
fn partitions_share_the_training_class_index() {
    let dir = tempfile::tempdir().unwrap();
    common::write_dataset(dir.path(), &["fm", "am"], 2);
    // validation lacks a class; labels must still follow the training order
    fs::remove_dir_all(dir.path().join("validation/am")).unwrap();

    let partitions = Partitions::load(dir.path(), 8).unwrap();

    assert_eq!(partitions.classes.names(), ["am", "fm"]);
    assert_eq!(partitions.validation.labels(), vec![1, 1]);
    assert_eq!(partitions.test.labels(), vec![0, 0, 1, 1]);
}
