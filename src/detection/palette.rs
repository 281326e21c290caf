//! Hand-tuned colour ranges for every feature the loops look for.

use super::hsv::ColorRange;

/// Visual features recognised on screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    /// Ring that has turned green (click window open)
    RingGreen,
    /// Shrinking white ring
    RingWhite,
    /// Target zone of the bar minigame
    BarYellow,
    /// White slit marker riding the bar
    SlitWhite,
    /// Large green "GO" banner between phases
    GoGreen,
}

const RANGES: [ColorRange; 5] = [
    ColorRange::new([28, 55, 65], [75, 255, 255]),
    ColorRange::new([0, 0, 210], [180, 40, 255]),
    ColorRange::new([18, 25, 30], [50, 255, 200]),
    ColorRange::new([0, 0, 170], [180, 60, 255]),
    ColorRange::new([35, 80, 80], [85, 255, 255]),
];

impl Feature {
    pub const ALL: [Feature; 5] = [
        Feature::RingGreen,
        Feature::RingWhite,
        Feature::BarYellow,
        Feature::SlitWhite,
        Feature::GoGreen,
    ];

    /// Returns the colour range for this feature.
    pub fn range(self) -> &'static ColorRange {
        &RANGES[self as usize]
    }
}
