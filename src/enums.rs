use serde::{Deserialize, Serialize};

/// One of the three orthogonal cutting planes.
///
/// The discriminant is the index of the cursor axis pair the plane uses, so
/// `Orientation::Axial as usize == 2` selects the (axis0, axis1) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Orientation {
    Sagittal = 0,
    Coronal = 1,
    Axial = 2,
}

impl Orientation {
    pub const ALL: [Orientation; 3] = [
        Orientation::Sagittal,
        Orientation::Coronal,
        Orientation::Axial,
    ];

    /// Index of the cursor axis pair that defines this plane.
    pub fn axis_pair(self) -> usize {
        self as usize
    }

    /// Index of the world axis this plane is perpendicular to (x = 0, y = 1, z = 2).
    pub fn normal_axis(self) -> usize {
        self as usize
    }
}

/// Identifier of a bound view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViewId {
    Axial,
    Coronal,
    Sagittal,
    Fourth,
}

impl ViewId {
    /// The orthogonal orientation behind this view, if it has one.
    pub fn orientation(self) -> Option<Orientation> {
        match self {
            ViewId::Axial => Some(Orientation::Axial),
            ViewId::Coronal => Some(Orientation::Coronal),
            ViewId::Sagittal => Some(Orientation::Sagittal),
            ViewId::Fourth => None,
        }
    }
}

impl From<Orientation> for ViewId {
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Axial => ViewId::Axial,
            Orientation::Coronal => ViewId::Coronal,
            Orientation::Sagittal => ViewId::Sagittal,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    #[default]
    Linear,
    Nearest,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragKind {
    Rotate,
    Translate,
}

/// Interactive handles attached to a reference line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlPoint {
    Left,
    Right,
    Center,
}

impl ControlPoint {
    pub fn drag_kind(self) -> DragKind {
        match self {
            ControlPoint::Left | ControlPoint::Right => DragKind::Rotate,
            ControlPoint::Center => DragKind::Translate,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FourthViewMode {
    Outline,
    #[default]
    Oblique,
}

/// Toggleable scene elements of a render surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Actor {
    Image,
    Outline,
    ReferenceLine,
    RoiBox,
}
