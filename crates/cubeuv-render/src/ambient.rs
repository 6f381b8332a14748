//! Ambient renderer output settings and the scope guard that neutralises them
//! for the duration of a composite pass.

use std::ops::{Deref, DerefMut};

use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::device::CompositeDevice;
use crate::encoding::{gamma_to_linear, linear_to_gamma};

/// Opaque identity of a render target owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

/// Tone-mapping operator applied to every written pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToneMapping {
    /// Values pass through unchanged; exposure is ignored.
    None,
    /// Scale by exposure only.
    Linear,
    Reinhard,
    AcesFilmic,
}

impl ToneMapping {
    /// Identifier shared with the WGSL composite shader.
    pub(crate) fn shader_id(self) -> u32 {
        match self {
            ToneMapping::None => 0,
            ToneMapping::Linear => 1,
            ToneMapping::Reinhard => 2,
            ToneMapping::AcesFilmic => 3,
        }
    }

    /// Apply the operator to a linear color.
    pub fn apply(self, color: Vec3, exposure: f32) -> Vec3 {
        match self {
            ToneMapping::None => color,
            ToneMapping::Linear => color * exposure,
            ToneMapping::Reinhard => {
                let c = color * exposure;
                c / (Vec3::ONE + c)
            }
            ToneMapping::AcesFilmic => {
                let c = color * exposure;
                let (a, b, cc, d, e) = (2.51, 0.03, 2.43, 0.59, 0.14);
                ((c * (a * c + b)) / (c * (cc * c + d) + e)).clamp(Vec3::ZERO, Vec3::ONE)
            }
        }
    }
}

/// Snapshot of the device-wide output configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientState {
    /// Treat linear-encoded source texels as gamma encoded.
    pub gamma_input: bool,
    /// Gamma-encode every written pixel.
    pub gamma_output: bool,
    pub tone_mapping: ToneMapping,
    pub exposure: f32,
    /// Currently bound render target; `None` is the default framebuffer.
    pub render_target: Option<TargetId>,
}

impl Default for AmbientState {
    fn default() -> Self {
        Self {
            gamma_input: false,
            gamma_output: false,
            tone_mapping: ToneMapping::None,
            exposure: 1.0,
            render_target: None,
        }
    }
}

impl AmbientState {
    /// Settings under which a pass writes raw linear samples.
    pub fn neutral(render_target: Option<TargetId>) -> Self {
        Self {
            gamma_input: false,
            gamma_output: false,
            tone_mapping: ToneMapping::Linear,
            exposure: 1.0,
            render_target,
        }
    }

    /// Apply the input side of the settings to a decoded source texel.
    pub fn apply_input(&self, linear: Vec4) -> Vec4 {
        if self.gamma_input {
            gamma_to_linear(linear)
        } else {
            linear
        }
    }

    /// Apply the output side (tone mapping, exposure, gamma) to a linear color.
    pub fn apply_output(&self, linear: Vec4) -> Vec4 {
        let mapped = self
            .tone_mapping
            .apply(linear.xyz(), self.exposure)
            .extend(linear.w);
        if self.gamma_output {
            linear_to_gamma(mapped)
        } else {
            mapped
        }
    }
}

/// Neutralises a device's ambient state and restores the snapshot on drop.
///
/// Restoration runs on every exit path, including early returns through `?`.
pub struct AmbientScope<'a, D: CompositeDevice> {
    device: &'a mut D,
    saved: AmbientState,
}

impl<'a, D: CompositeDevice> AmbientScope<'a, D> {
    /// Snapshot the device's ambient state and switch it to [`AmbientState::neutral`].
    pub fn enter(device: &'a mut D) -> Self {
        let saved = device.ambient();
        device.set_ambient(&AmbientState::neutral(saved.render_target));
        log::trace!("Entered neutral ambient scope (saved {saved:?})");
        Self { device, saved }
    }

    /// The state that will be restored.
    pub fn saved(&self) -> &AmbientState {
        &self.saved
    }
}

impl<D: CompositeDevice> Deref for AmbientScope<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.device
    }
}

impl<D: CompositeDevice> DerefMut for AmbientScope<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.device
    }
}

impl<D: CompositeDevice> Drop for AmbientScope<'_, D> {
    fn drop(&mut self) {
        self.device.set_ambient(&self.saved);
        log::trace!("Restored ambient state {:?}", self.saved);
    }
}
