use crate::model::{FluxModel, Sizing};

/// A named shortcut binding a model to a fixed size or aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionOption {
    pub name: &'static str,
    pub model: FluxModel,
    pub size: PresetSize,
}

/// Size half of a [`DimensionOption`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresetSize {
    Dimensions { width: u32, height: u32 },
    AspectRatio(&'static str),
}

impl DimensionOption {
    const fn dims(name: &'static str, model: FluxModel, width: u32, height: u32) -> Self {
        Self {
            name,
            model,
            size: PresetSize::Dimensions { width, height },
        }
    }

    const fn ratio(name: &'static str, ratio: &'static str) -> Self {
        Self {
            name,
            model: FluxModel::Pro11Ultra,
            size: PresetSize::AspectRatio(ratio),
        }
    }

    pub fn sizing(&self) -> Sizing {
        match self.size {
            PresetSize::Dimensions { width, height } => Sizing::Dimensions { width, height },
            PresetSize::AspectRatio(r) => Sizing::AspectRatio(r.to_string()),
        }
    }
}

/// Preset used when the host does not pick one.
pub const DEFAULT_PRESET: &str = "flux-dev: 1440x1440";

/// Every selectable model/size combination, in display order.
pub static DIMENSION_PRESETS: &[DimensionOption] = &[
    DimensionOption::dims("flux-dev: 1440x1440", FluxModel::Dev, 1440, 1440),
    DimensionOption::dims("flux-dev: 1440x896", FluxModel::Dev, 1440, 896),
    DimensionOption::dims("flux-dev: 896x1440", FluxModel::Dev, 896, 1440),
    DimensionOption::dims("flux-pro-1.1: 1440x1440", FluxModel::Pro11, 1440, 1440),
    DimensionOption::dims("flux-pro-1.1: 1440x896", FluxModel::Pro11, 1440, 896),
    DimensionOption::dims("flux-pro-1.1: 896x1440", FluxModel::Pro11, 896, 1440),
    DimensionOption::ratio("flux-pro-1.1-ultra: 1:1", "1:1"),
    DimensionOption::ratio("flux-pro-1.1-ultra: 16:9", "16:9"),
    DimensionOption::ratio("flux-pro-1.1-ultra: 9:16", "9:16"),
];

/// Look up a preset by its exact display name.
pub fn find_preset(name: &str) -> Option<&'static DimensionOption> {
    let name = name.trim();
    DIMENSION_PRESETS.iter().find(|p| p.name == name)
}

/// Preset names, for populating a host-side selection list.
pub fn preset_names() -> impl Iterator<Item = &'static str> {
    DIMENSION_PRESETS.iter().map(|p| p.name)
}
