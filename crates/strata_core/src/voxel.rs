//! Voxel data structures.
//!
//! A voxel is packed into 4 bytes so chunk arrays cast straight to bytes
//! for storage.
//!
//! Layout:
//! - Byte 0: density. High nibble = foreground (current, diggable),
//!   low nibble = background (original, revealed once dug).
//! - Byte 1: material ID.
//! - Bytes 2-3: 15-bit RGB color (`0b0RRRRRGGGGGBBBBB`).
//!
//! Density runs from `0` (fully inside the solid) to [`DENSITY_MAX`]
//! (fully outside, air). The rendered surface sits at [`ISOLEVEL`].

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Density of a sample fully outside the solid (air).
pub const DENSITY_MAX: u8 = 15;

/// Density of a sample fully inside the solid.
pub const DENSITY_SOLID: u8 = 0;

/// Density threshold where the surface lies.
///
/// Sits halfway between two integer densities so a quantized sample is
/// never exactly on the surface.
pub const ISOLEVEL: f32 = 7.5;

/// The dominant substance of a voxel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Material {
    /// Empty space.
    #[default]
    Air = 0,
    /// Loose topsoil.
    Dirt = 1,
    /// Bedrock below the soil layer.
    Rock = 2,
    /// Sand.
    Sand = 3,
    /// Clay.
    Clay = 4,
}

impl Material {
    /// Converts from the stored byte.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Air),
            1 => Some(Self::Dirt),
            2 => Some(Self::Rock),
            3 => Some(Self::Sand),
            4 => Some(Self::Clay),
            _ => None,
        }
    }

    /// Returns true for anything but air.
    #[inline]
    #[must_use]
    pub const fn is_solid(self) -> bool {
        !matches!(self, Self::Air)
    }

    /// Default tint used when a voxel is generated.
    #[must_use]
    pub const fn base_color(self) -> Color15 {
        match self {
            Self::Air => Color15::BLACK,
            Self::Dirt => Color15::new(17, 11, 6),
            Self::Rock => Color15::new(13, 13, 14),
            Self::Sand => Color15::new(29, 26, 17),
            Self::Clay => Color15::new(22, 12, 9),
        }
    }
}

/// Which of the two packed densities to read.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DensityLayer {
    /// Current density, lowered by nothing and raised by digging.
    #[default]
    Foreground,
    /// Density as generated, never touched by digging.
    Background,
}

/// Packed 15-bit RGB color, 5 bits per channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Color15(u16);

impl Color15 {
    /// All channels zero.
    pub const BLACK: Self = Self(0);

    /// Creates a color from 5-bit channels. Extra bits are masked off.
    #[inline]
    #[must_use]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self((((r & 0x1F) as u16) << 10) | (((g & 0x1F) as u16) << 5) | (b & 0x1F) as u16)
    }

    /// Creates a color from 8-bit channels, dropping the low 3 bits.
    #[inline]
    #[must_use]
    pub const fn from_rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::new(r >> 3, g >> 3, b >> 3)
    }

    /// Wraps a raw packed value. Bit 15 is ignored.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u16) -> Self {
        Self(raw & 0x7FFF)
    }

    /// Returns the packed value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Red channel (0-31).
    #[inline]
    #[must_use]
    pub const fn r(self) -> u8 {
        ((self.0 >> 10) & 0x1F) as u8
    }

    /// Green channel (0-31).
    #[inline]
    #[must_use]
    pub const fn g(self) -> u8 {
        ((self.0 >> 5) & 0x1F) as u8
    }

    /// Blue channel (0-31).
    #[inline]
    #[must_use]
    pub const fn b(self) -> u8 {
        (self.0 & 0x1F) as u8
    }
}

/// A single voxel - 4 bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Voxel {
    /// Packed densities: foreground high nibble, background low nibble.
    pub density: u8,
    /// Material ID, see [`Material`].
    pub material: u8,
    /// Packed [`Color15`].
    pub color: u16,
}

impl Default for Voxel {
    fn default() -> Self {
        Self::AIR
    }
}

impl Voxel {
    /// Air in both layers.
    pub const AIR: Self = Self {
        density: pack(DENSITY_MAX, DENSITY_MAX),
        material: Material::Air as u8,
        color: 0,
    };

    /// Fully solid voxel of the given material, tinted with its base color.
    #[inline]
    #[must_use]
    pub const fn solid(material: Material) -> Self {
        Self::with_density(material, DENSITY_SOLID)
    }

    /// Voxel whose foreground and background both hold `density`.
    #[inline]
    #[must_use]
    pub const fn with_density(material: Material, density: u8) -> Self {
        let d = clamp_density(density);
        Self {
            density: pack(d, d),
            material: material as u8,
            color: material.base_color().raw(),
        }
    }

    /// Foreground (current) density.
    #[inline]
    #[must_use]
    pub const fn foreground(self) -> u8 {
        self.density >> 4
    }

    /// Background (original) density.
    #[inline]
    #[must_use]
    pub const fn background(self) -> u8 {
        self.density & 0x0F
    }

    /// Reads one of the two densities.
    #[inline]
    #[must_use]
    pub const fn density_of(self, layer: DensityLayer) -> u8 {
        match layer {
            DensityLayer::Foreground => self.foreground(),
            DensityLayer::Background => self.background(),
        }
    }

    /// Overwrites the foreground density, leaving the background alone.
    #[inline]
    pub fn set_foreground(&mut self, density: u8) {
        self.density = pack(clamp_density(density), self.background());
    }

    /// Raises the foreground density to `density` if it is currently lower.
    ///
    /// Returns true when the voxel changed. Never lowers the density.
    #[inline]
    pub fn raise_foreground(&mut self, density: u8) -> bool {
        let density = clamp_density(density);
        if density <= self.foreground() {
            return false;
        }
        self.set_foreground(density);
        true
    }

    /// Returns the material, or `None` for an unknown stored byte.
    #[inline]
    #[must_use]
    pub const fn material(self) -> Option<Material> {
        Material::from_u8(self.material)
    }

    /// Returns the packed color.
    #[inline]
    #[must_use]
    pub const fn color(self) -> Color15 {
        Color15::from_raw(self.color)
    }

    /// True when the foreground density is on the solid side of the surface.
    #[inline]
    #[must_use]
    pub fn is_solid(self) -> bool {
        f32::from(self.foreground()) < ISOLEVEL
    }
}

#[inline]
const fn pack(foreground: u8, background: u8) -> u8 {
    (foreground << 4) | (background & 0x0F)
}

#[inline]
const fn clamp_density(density: u8) -> u8 {
    if density > DENSITY_MAX {
        DENSITY_MAX
    } else {
        density
    }
}

/// Quantizes a continuous density to the stored 4-bit range.
#[inline]
#[must_use]
pub fn quantize_density(value: f32) -> u8 {
    value.round().clamp(0.0, f32::from(DENSITY_MAX)) as u8
}
