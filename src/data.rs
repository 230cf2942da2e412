use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use burn::{
    data::{
        dataloader::{batcher::Batcher, DataLoader, DataLoaderBuilder},
        dataset::{transform::MapperDataset, Dataset, InMemDataset},
    },
    prelude::*,
};
use image::{imageops::FilterType, ImageReader, RgbImage};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};

use crate::{
    augmentation::AugmentationConfig,
    classes::{class_directories, ClassIndex},
    error::{Error, Result},
};

const CHANNEL_COUNT: usize = 3;

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "bmp", "ppm", "tif", "tiff"];

#[derive(Config, Debug)]
pub struct LoaderConfig {
    #[config(default = 224)]
    pub image_size: usize,

    #[config(default = 10)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub worker_count: usize,

    #[config(default = 42)]
    pub seed: u64,
}

#[derive(Debug, Clone)]
pub struct ModulationImage {
    pub image: RgbImage,
    pub label: usize,
}

/// One dataset partition (`train`, `validation` or `test`), decoded in
/// enumeration order: classes sorted by name, files sorted by name.
pub struct ModulationDataset {
    pub dataset: InMemDataset<ModulationImage>,
}

impl Dataset<ModulationImage> for ModulationDataset {
    fn get(&self, index: usize) -> Option<ModulationImage> {
        self.dataset.get(index)
    }

    fn len(&self) -> usize {
        self.dataset.len()
    }
}

impl ModulationDataset {
    pub fn load(partition_dir: &Path, classes: &ClassIndex, image_size: usize) -> Result<Self> {
        let files = enumerate_images(partition_dir, classes)?;
        if files.is_empty() {
            return Err(Error::EmptyPartition(partition_dir.to_path_buf()));
        }

        let side = image_size as u32;
        let items = files
            .into_par_iter()
            .map(|(path, label)| -> Result<ModulationImage> {
                let image = ImageReader::open(&path)?
                    .with_guessed_format()?
                    .decode()
                    .map_err(|source| Error::Image {
                        path: path.clone(),
                        source,
                    })?
                    .resize_exact(side, side, FilterType::Triangle)
                    .to_rgb8();

                Ok(ModulationImage { image, label })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            partition = %partition_dir.display(),
            images = items.len(),
            "loaded dataset partition"
        );

        Ok(Self {
            dataset: InMemDataset::new(items),
        })
    }

    pub fn labels(&self) -> Vec<usize> {
        (0..self.len())
            .filter_map(|index| self.get(index).map(|item| item.label))
            .collect()
    }
}

fn enumerate_images(partition_dir: &Path, classes: &ClassIndex) -> Result<Vec<(PathBuf, usize)>> {
    let mut files = Vec::new();

    for class in class_directories(partition_dir)? {
        let label = classes.index_of(&class).ok_or_else(|| Error::UnknownClass {
            partition: partition_dir.to_path_buf(),
            class: class.clone(),
        })?;

        let mut paths = Vec::new();
        for entry in fs::read_dir(partition_dir.join(&class))? {
            let path = entry?.path();
            if path.is_file() && has_image_extension(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        debug!(class = %class, label, images = paths.len(), "enumerated class directory");
        files.extend(paths.into_iter().map(|path| (path, label)));
    }

    Ok(files)
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| extension.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct ModulationBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

#[derive(Clone)]
pub struct ModulationBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> ModulationBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }
}

impl<B: Backend> Batcher<ModulationImage, ModulationBatch<B>> for ModulationBatcher<B> {
    fn batch(&self, items: Vec<ModulationImage>) -> ModulationBatch<B> {
        let (width, height) = items
            .first()
            .map(|item| item.image.dimensions())
            .unwrap_or((0, 0));
        let (width, height) = (width as usize, height as usize);

        let pixels: Vec<f32> = items
            .iter()
            .flat_map(|item| item.image.as_raw().iter().map(|&value| value as f32))
            .collect();

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [items.len(), height, width, CHANNEL_COUNT])
                .convert::<B::FloatElem>(),
            &self.device,
        )
        .permute([0, 3, 1, 2])
            / 255.;

        let labels: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(labels, [items.len()]).convert::<B::IntElem>(),
            &self.device,
        );

        ModulationBatch { images, targets }
    }
}

/// Training loader: augmented, reshuffled every epoch, prefetched by workers.
pub fn training_loader<B: Backend>(
    dataset: ModulationDataset,
    augmentation: &AugmentationConfig,
    config: &LoaderConfig,
    device: B::Device,
) -> Arc<dyn DataLoader<ModulationBatch<B>>> {
    DataLoaderBuilder::new(ModulationBatcher::<B>::new(device))
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.worker_count)
        .build(MapperDataset::new(dataset, augmentation.init(config.seed)))
}

/// Rescale-only loader that yields batches in dataset order.
pub fn evaluation_loader<B: Backend>(
    dataset: ModulationDataset,
    config: &LoaderConfig,
    device: B::Device,
) -> Arc<dyn DataLoader<ModulationBatch<B>>> {
    DataLoaderBuilder::new(ModulationBatcher::<B>::new(device))
        .batch_size(config.batch_size)
        .build(dataset)
}

/// The three partitions of a dataset root, labelled through one [`ClassIndex`].
pub struct Partitions {
    pub classes: ClassIndex,
    pub train: ModulationDataset,
    pub validation: ModulationDataset,
    pub test: ModulationDataset,
}

impl Partitions {
    pub fn load(data_dir: &Path, image_size: usize) -> Result<Self> {
        let classes = ClassIndex::discover(&data_dir.join("train"))?;
        info!(classes = ?classes.names(), "discovered modulation classes");

        Ok(Self {
            train: ModulationDataset::load(&data_dir.join("train"), &classes, image_size)?,
            validation: ModulationDataset::load(&data_dir.join("validation"), &classes, image_size)?,
            test: ModulationDataset::load(&data_dir.join("test"), &classes, image_size)?,
            classes,
        })
    }
}
