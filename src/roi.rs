use std::fmt;
use std::slice::Iter;

use opencv::core::{Rect, Size};

/// Capture resolutions a region or template can be authored against.
#[derive(Clone, Copy, Debug)]
pub enum StreamResolution {
    SD480p,
    HD720p,
    HD1080p,
    Custom { width: i32, height: i32 },
}

/// Regions and templates are authored against 1080p unless stated otherwise.
pub const REFERENCE_RESOLUTION: StreamResolution = StreamResolution::HD1080p;

impl StreamResolution {
    pub fn new(width: i32, height: i32) -> Self {
        match (width, height) {
            (640, 480) => StreamResolution::SD480p,
            (1280, 720) => StreamResolution::HD720p,
            (1920, 1080) => StreamResolution::HD1080p,
            (width, height) => StreamResolution::Custom { width, height },
        }
    }

    pub fn width(&self) -> i32 {
        match self {
            StreamResolution::SD480p => 640,
            StreamResolution::HD720p => 1280,
            StreamResolution::HD1080p => 1920,
            StreamResolution::Custom { width, .. } => *width,
        }
    }

    pub fn height(&self) -> i32 {
        match self {
            StreamResolution::SD480p => 480,
            StreamResolution::HD720p => 720,
            StreamResolution::HD1080p => 1080,
            StreamResolution::Custom { height, .. } => *height,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Horizontal and vertical scale factors taking `self` to `to`.
    pub fn ratios_to(&self, to: StreamResolution) -> (f32, f32) {
        (
            to.width() as f32 / self.width() as f32,
            to.height() as f32 / self.height() as f32,
        )
    }
}

impl PartialEq for StreamResolution {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width() && self.height() == other.height()
    }
}

impl Eq for StreamResolution {}

impl fmt::Display for StreamResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width(), self.height())
    }
}

/// Maps a rectangle defined in `from` into `to`.
///
/// Position and size scale independently per axis and are truncated to whole
/// pixels, so the same inputs always land on the same pixel grid.
pub fn rescale_rect(rect: Rect, from: StreamResolution, to: StreamResolution) -> Rect {
    if from == to {
        return rect;
    }

    let (width_ratio, height_ratio) = from.ratios_to(to);

    Rect::new(
        (rect.x as f32 * width_ratio) as i32,
        (rect.y as f32 * height_ratio) as i32,
        (rect.width as f32 * width_ratio) as i32,
        (rect.height as f32 * height_ratio) as i32,
    )
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionOfInterest {
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub resolution: StreamResolution,
}

pub fn new_region(
    name: String,
    x: i32,
    y: i32,
    width: i32,
    height: i32,
    resolution: StreamResolution,
) -> RegionOfInterest {
    RegionOfInterest {
        name,
        x,
        y,
        width,
        height,
        resolution,
    }
}

impl RegionOfInterest {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    /// The same region expressed in another resolution's coordinates.
    pub fn rescale(&self, to: StreamResolution) -> RegionOfInterest {
        let rect = rescale_rect(self.rect(), self.resolution, to);

        RegionOfInterest {
            name: self.name.clone(),
            x: rect.x,
            y: rect.y,
            width: rect.width,
            height: rect.height,
            resolution: to,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegionOfInterestList {
    list: Vec<RegionOfInterest>,
}

pub fn new_region_list() -> RegionOfInterestList {
    RegionOfInterestList { list: Vec::new() }
}

impl RegionOfInterestList {
    pub fn add_region(&mut self, region: RegionOfInterest) {
        self.list.push(region);
    }

    pub fn add_new_region(
        &mut self,
        name: String,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        resolution: StreamResolution,
    ) {
        let region = new_region(name, x, y, width, height, resolution);

        self.add_region(region);
    }

    pub fn get(&self, name: &str) -> Option<&RegionOfInterest> {
        self.list.iter().find(|r| r.name == name)
    }

    /// Every region mapped into `to`, for a capture running at that resolution.
    pub fn rescale(&self, to: StreamResolution) -> RegionOfInterestList {
        RegionOfInterestList {
            list: self.list.iter().map(|r| r.rescale(to)).collect(),
        }
    }

    pub fn iter(&self) -> Iter<RegionOfInterest> {
        self.list.iter()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }
}
