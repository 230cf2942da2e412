use std::{fs, path::Path};

use image::{Rgb, RgbImage};

/// Writes `count` small PNGs per class into `root/partition/class/`. Each class
/// gets its own colour so the classes are separable.
pub fn write_partition(root: &Path, partition: &str, classes: &[&str], count: usize) {
    for (label, class) in classes.iter().enumerate() {
        let dir = root.join(partition).join(class);
        fs::create_dir_all(&dir).unwrap();

        for index in 0..count {
            let shade = (40 * label as u8).wrapping_add(index as u8);
            let image = RgbImage::from_fn(32, 32, |x, y| {
                if (x + y) % 2 == 0 {
                    Rgb([shade, 255 - shade, 128])
                } else {
                    Rgb([255 - shade, shade, 64])
                }
            });
            image.save(dir.join(format!("{index:03}.png"))).unwrap();
        }
    }
}

pub fn write_dataset(root: &Path, classes: &[&str], per_class: usize) {
    for partition in ["train", "validation", "test"] {
        write_partition(root, partition, classes, per_class);
    }
}
