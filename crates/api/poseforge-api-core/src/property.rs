use nalgebra::{Unit, Vector3};
use serde::{Deserialize, Serialize};

/// One animatable scalar channel of a scene node. Curves are stored in a
/// fixed-size array indexed by this enum, so lookup is O(1) without any
/// reflection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimProperty {
    PosX,
    PosY,
    PosZ,
    RotX,
    RotY,
    RotZ,
    ScaleX,
    ScaleY,
    ScaleZ,
    LightIntensity,
    CameraFov,
}

impl AnimProperty {
    pub const COUNT: usize = 11;

    pub const ALL: [AnimProperty; Self::COUNT] = [
        Self::PosX,
        Self::PosY,
        Self::PosZ,
        Self::RotX,
        Self::RotY,
        Self::RotZ,
        Self::ScaleX,
        Self::ScaleY,
        Self::ScaleZ,
        Self::LightIntensity,
        Self::CameraFov,
    ];

    /// The nine transform channels recording always captures.
    pub const TRANSFORM: [AnimProperty; 9] = [
        Self::PosX,
        Self::PosY,
        Self::PosZ,
        Self::RotX,
        Self::RotY,
        Self::RotZ,
        Self::ScaleX,
        Self::ScaleY,
        Self::ScaleZ,
    ];

    /// The six channels a pose degree of freedom can address.
    pub const POSE: [AnimProperty; 6] = [
        Self::PosX,
        Self::PosY,
        Self::PosZ,
        Self::RotX,
        Self::RotY,
        Self::RotZ,
    ];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Self::PosX => 0,
            Self::PosY => 1,
            Self::PosZ => 2,
            Self::RotX => 3,
            Self::RotY => 4,
            Self::RotZ => 5,
            Self::ScaleX => 6,
            Self::ScaleY => 7,
            Self::ScaleZ => 8,
            Self::LightIntensity => 9,
            Self::CameraFov => 10,
        }
    }

    #[inline]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    #[inline]
    pub fn name(self) -> &'static str {
        match self {
            Self::PosX => "position.x",
            Self::PosY => "position.y",
            Self::PosZ => "position.z",
            Self::RotX => "rotation.x",
            Self::RotY => "rotation.y",
            Self::RotZ => "rotation.z",
            Self::ScaleX => "scale.x",
            Self::ScaleY => "scale.y",
            Self::ScaleZ => "scale.z",
            Self::LightIntensity => "light.intensity",
            Self::CameraFov => "camera.fov",
        }
    }

    /// Rotation channels store Euler degrees and go through angle filtering
    /// on key insertion.
    #[inline]
    pub fn is_rotation(self) -> bool {
        matches!(self, Self::RotX | Self::RotY | Self::RotZ)
    }

    #[inline]
    pub fn is_position(self) -> bool {
        matches!(self, Self::PosX | Self::PosY | Self::PosZ)
    }

    #[inline]
    pub fn is_scale(self) -> bool {
        matches!(self, Self::ScaleX | Self::ScaleY | Self::ScaleZ)
    }

    #[inline]
    pub fn is_pose_channel(self) -> bool {
        self.is_position() || self.is_rotation()
    }

    /// Axis a pose channel perturbs; `None` for scale and extra channels.
    #[inline]
    pub fn axis(self) -> Option<Unit<Vector3<f32>>> {
        match self {
            Self::PosX | Self::RotX => Some(Vector3::x_axis()),
            Self::PosY | Self::RotY => Some(Vector3::y_axis()),
            Self::PosZ | Self::RotZ => Some(Vector3::z_axis()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip() {
        for property in AnimProperty::ALL {
            assert_eq!(AnimProperty::from_index(property.index()), Some(property));
        }
    }

    #[test]
    fn channel_classification() {
        assert!(AnimProperty::RotY.is_rotation());
        assert!(AnimProperty::RotY.is_pose_channel());
        assert!(AnimProperty::PosZ.is_pose_channel());
        assert!(!AnimProperty::ScaleX.is_pose_channel());
        assert!(AnimProperty::ScaleX.axis().is_none());
        assert!(AnimProperty::LightIntensity.axis().is_none());
    }
}
