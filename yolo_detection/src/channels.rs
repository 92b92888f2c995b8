//! Colour channel ordering.
//!
//! Decoded uploads and every image handed back for display are RGB. Some
//! exported detectors expect BGR input, so the model-input boundary is the
//! single place where pixels get reordered.

use image::{Rgb, RgbImage};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    #[default]
    Rgb,
    Bgr,
}

impl ChannelOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelOrder::Rgb => "rgb",
            ChannelOrder::Bgr => "bgr",
        }
    }
}

/// Returns `image`, whose pixels are laid out in `from` order, with its
/// pixels laid out in `to` order. Same-order conversion is a plain copy.
pub fn reorder(image: &RgbImage, from: ChannelOrder, to: ChannelOrder) -> RgbImage {
    if from == to {
        return image.clone();
    }

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let [a, b, c] = pixel.0;
        *pixel = Rgb([c, b, a]);
    }
    out
}
