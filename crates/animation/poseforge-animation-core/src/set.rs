//! Per-node bundle of curves. Position, rotation, and scale channels are
//! evaluated independently and combined into a single local transform;
//! missing channels fall back to the node's static components.

use nalgebra::Vector3;
use poseforge_api_core::{euler_deg_to_quat, quat_to_euler_deg, AnimProperty, NodeId, Transform};
use serde::{Deserialize, Serialize};

use crate::curve::Curve;

/// Light/camera channel values sampled alongside the transform.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ExtraSample {
    pub light_intensity: Option<f32>,
    pub camera_fov: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationSet {
    node: NodeId,
    curves: [Option<Curve>; AnimProperty::COUNT],
}

impl AnimationSet {
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            curves: Default::default(),
        }
    }

    #[inline]
    pub fn node(&self) -> NodeId {
        self.node
    }

    #[inline]
    pub fn curve(&self, property: AnimProperty) -> Option<&Curve> {
        self.curves[property.index()].as_ref()
    }

    #[inline]
    pub fn curve_mut(&mut self, property: AnimProperty) -> Option<&mut Curve> {
        self.curves[property.index()].as_mut()
    }

    /// Curve for `property`, created empty on first use.
    pub fn ensure_curve(&mut self, property: AnimProperty) -> &mut Curve {
        self.curves[property.index()].get_or_insert_with(|| Curve::new(property))
    }

    pub fn remove_curve(&mut self, property: AnimProperty) -> Option<Curve> {
        self.curves[property.index()].take()
    }

    pub fn iter_curves(&self) -> impl Iterator<Item = &Curve> {
        self.curves.iter().flatten()
    }

    /// True when no curve holds any key; an empty set is pruned from the
    /// scheduler's registry.
    pub fn is_empty(&self) -> bool {
        self.iter_curves().all(Curve::is_empty)
    }

    /// Union of the keyed frame ranges across all curves.
    pub fn frame_span(&self) -> Option<(i32, i32)> {
        let mut span: Option<(i32, i32)> = None;
        for curve in self.iter_curves() {
            if let Some((first, last)) = curve.frame_span() {
                span = Some(match span {
                    Some((lo, hi)) => (lo.min(first), hi.max(last)),
                    None => (first, last),
                });
            }
        }
        span
    }

    #[inline]
    fn channel_or(&self, property: AnimProperty, frame: i32, fallback: f32) -> f32 {
        self.curve(property)
            .and_then(|curve| curve.evaluate(frame))
            .unwrap_or(fallback)
    }

    /// Compose the local transform at `frame`. Channels without a curve (or
    /// outside their keyed range) keep the fallback's components.
    pub fn sample_local(&self, frame: i32, fallback: &Transform) -> Transform {
        let mut out = *fallback;
        out.position = Vector3::new(
            self.channel_or(AnimProperty::PosX, frame, fallback.position.x),
            self.channel_or(AnimProperty::PosY, frame, fallback.position.y),
            self.channel_or(AnimProperty::PosZ, frame, fallback.position.z),
        );
        out.scale = Vector3::new(
            self.channel_or(AnimProperty::ScaleX, frame, fallback.scale.x),
            self.channel_or(AnimProperty::ScaleY, frame, fallback.scale.y),
            self.channel_or(AnimProperty::ScaleZ, frame, fallback.scale.z),
        );
        let has_rotation = [AnimProperty::RotX, AnimProperty::RotY, AnimProperty::RotZ]
            .iter()
            .any(|p| self.curve(*p).is_some_and(|c| !c.is_empty()));
        if has_rotation {
            let base = quat_to_euler_deg(&fallback.rotation);
            let euler = Vector3::new(
                self.channel_or(AnimProperty::RotX, frame, base.x),
                self.channel_or(AnimProperty::RotY, frame, base.y),
                self.channel_or(AnimProperty::RotZ, frame, base.z),
            );
            out.rotation = euler_deg_to_quat(euler);
        }
        out
    }

    /// Sample the non-transform channels present on this set.
    pub fn sample_extras(&self, frame: i32) -> ExtraSample {
        ExtraSample {
            light_intensity: self
                .curve(AnimProperty::LightIntensity)
                .and_then(|curve| curve.evaluate(frame)),
            camera_fov: self
                .curve(AnimProperty::CameraFov)
                .and_then(|curve| curve.evaluate(frame)),
        }
    }
}
