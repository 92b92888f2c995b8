use crate::{
    config::{LabelsConfig, Validatable},
    error::ModelLoadError,
};
use std::{
    fs::File,
    io::{self, BufRead},
    path::Path,
};

/// Fallback colours for label lines that carry no colour of their own.
const PALETTE: [[u8; 3]; 20] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [207, 210, 49],
    [72, 249, 10],
    [146, 204, 23],
    [61, 219, 134],
    [26, 147, 52],
    [0, 212, 187],
    [44, 153, 168],
    [0, 194, 255],
    [52, 69, 147],
    [100, 115, 255],
    [0, 24, 236],
    [132, 56, 255],
    [82, 0, 133],
    [203, 56, 255],
    [255, 149, 200],
    [255, 55, 199],
];

pub fn palette_color(class_id: usize) -> [u8; 3] {
    PALETTE[class_id % PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorLabel {
    pub label: String,
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl ColorLabel {
    pub fn rgb(&self) -> [u8; 3] {
        [self.red, self.green, self.blue]
    }
}

/// Immutable class-index table shipped next to the model weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassLabels {
    class_labels: Vec<ColorLabel>,
}

impl ClassLabels {
    pub fn new(class_labels: Vec<ColorLabel>) -> Self {
        Self { class_labels }
    }

    /// Names only, coloured from the default palette.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        let class_labels = names
            .iter()
            .enumerate()
            .map(|(class_id, name)| {
                let [red, green, blue] = palette_color(class_id);
                ColorLabel {
                    label: name.as_ref().to_string(),
                    red,
                    green,
                    blue,
                }
            })
            .collect();
        Self { class_labels }
    }

    pub fn load(labels_cfg: &LabelsConfig) -> Result<Self, ModelLoadError> {
        let path = labels_cfg.get_path();
        let class_labels = load_yolo_labels(&path).map_err(|e| {
            ModelLoadError(format!("failed to load labels from {:?}: {}", path, e))
        })?;
        if class_labels.is_empty() {
            return Err(ModelLoadError(format!("labels file {:?} is empty", path)));
        }
        Ok(Self { class_labels })
    }

    pub fn len(&self) -> usize {
        self.class_labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.class_labels.is_empty()
    }

    pub fn get(&self, class_id: usize) -> Option<&ColorLabel> {
        self.class_labels.get(class_id)
    }

    pub fn name(&self, class_id: usize) -> String {
        match self.get(class_id) {
            Some(color_label) => color_label.label.clone(),
            None => format!("class {}", class_id),
        }
    }

    pub fn color(&self, class_id: usize) -> [u8; 3] {
        match self.get(class_id) {
            Some(color_label) => color_label.rgb(),
            None => palette_color(class_id),
        }
    }
}

/// Reads one class per line, either `name` or `name,red,green,blue`.
/// Blank lines and lines starting with `#` are skipped.
pub fn load_yolo_labels(filepath: &Path) -> io::Result<Vec<ColorLabel>> {
    let file = File::open(filepath)?;
    let reader = io::BufReader::new(file);
    let mut color_labels = Vec::new();

    for line_result in reader.lines() {
        let line = line_result?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        let color_label = match parts.as_slice() {
            [label] => {
                let [red, green, blue] = palette_color(color_labels.len());
                ColorLabel {
                    label: label.to_string(),
                    red,
                    green,
                    blue,
                }
            }
            [label, red, green, blue] => ColorLabel {
                label: label.to_string(),
                red: parse_channel(red, "red")?,
                green: parse_channel(green, "green")?,
                blue: parse_channel(blue, "blue")?,
            },
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("Invalid line format: {}", line),
                ))
            }
        };

        if color_label.label.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Empty label in line: {}", line),
            ));
        }
        color_labels.push(color_label);
    }

    Ok(color_labels)
}

fn parse_channel(value: &str, channel: &str) -> io::Result<u8> {
    value.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Invalid {} value: {}", channel, value),
        )
    })
}
