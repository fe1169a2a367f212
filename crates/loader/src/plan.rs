//! The fixed extraction plan: which columns build which channel.
//!
//! Spherical-harmonic "rest" coefficients are stored 15 per color channel:
//! three for band 0, then four for each of bands 1-3. Channel `r` owns
//! `f_rest_0..=14`, `g` owns `f_rest_15..=29`, `b` owns `f_rest_30..=44`.

/// Color channel of a spherical-harmonic coefficient group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorChannel {
    R,
    G,
    B,
}

impl ColorChannel {
    pub const ALL: [ColorChannel; 3] = [ColorChannel::R, ColorChannel::G, ColorChannel::B];

    pub fn index(self) -> usize {
        match self {
            ColorChannel::R => 0,
            ColorChannel::G => 1,
            ColorChannel::B => 2,
        }
    }

    /// The `f_dc_*` column holding this channel's direct coefficient.
    fn dc_column(self) -> usize {
        self.index()
    }

    /// First `f_rest_*` index of this channel's band-0 slice.
    fn band0_rest_base(self) -> usize {
        self.index() * REST_PER_CHANNEL
    }

    /// First `f_rest_*` index of this channel's band 1-3 coefficients.
    fn higher_rest_base(self) -> usize {
        self.band0_rest_base() + BAND0_REST
    }
}

/// One of the three higher spherical-harmonic bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShBand {
    One,
    Two,
    Three,
}

impl ShBand {
    pub const ALL: [ShBand; 3] = [ShBand::One, ShBand::Two, ShBand::Three];

    /// Slot in `color_bands1_3` (band 1 is slot 0).
    pub fn index(self) -> usize {
        match self {
            ShBand::One => 0,
            ShBand::Two => 1,
            ShBand::Three => 2,
        }
    }
}

const BAND0_REST: usize = 3;
const COEFFS_PER_HIGHER_BAND: usize = 4;
const REST_PER_CHANNEL: usize = BAND0_REST + 3 * COEFFS_PER_HIGHER_BAND;

/// Number of `f_rest_*` columns a conforming file carries.
pub const REST_COLUMN_COUNT: usize = 3 * REST_PER_CHANNEL;

/// An independent unit of decode work; each writes one disjoint output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionTask {
    Position,
    Rotation,
    Scale,
    Band0(ColorChannel),
    HigherBand(ColorChannel, ShBand),
}

/// Every task needed to build a particle set.
pub const EXTRACTION_PLAN: [ExtractionTask; 15] = [
    ExtractionTask::Position,
    ExtractionTask::Rotation,
    ExtractionTask::Scale,
    ExtractionTask::Band0(ColorChannel::R),
    ExtractionTask::Band0(ColorChannel::G),
    ExtractionTask::Band0(ColorChannel::B),
    ExtractionTask::HigherBand(ColorChannel::R, ShBand::One),
    ExtractionTask::HigherBand(ColorChannel::G, ShBand::One),
    ExtractionTask::HigherBand(ColorChannel::B, ShBand::One),
    ExtractionTask::HigherBand(ColorChannel::R, ShBand::Two),
    ExtractionTask::HigherBand(ColorChannel::G, ShBand::Two),
    ExtractionTask::HigherBand(ColorChannel::B, ShBand::Two),
    ExtractionTask::HigherBand(ColorChannel::R, ShBand::Three),
    ExtractionTask::HigherBand(ColorChannel::G, ShBand::Three),
    ExtractionTask::HigherBand(ColorChannel::B, ShBand::Three),
];

impl ExtractionTask {
    /// Source columns, in the order their values fill the output vector.
    pub fn column_names(self) -> Vec<String> {
        match self {
            ExtractionTask::Position => ["x", "y", "z", "opacity"].map(String::from).to_vec(),
            ExtractionTask::Rotation => (0..4).map(|k| format!("rot_{k}")).collect(),
            ExtractionTask::Scale => (0..3).map(|k| format!("scale_{k}")).collect(),
            ExtractionTask::Band0(channel) => {
                let mut names = vec![format!("f_dc_{}", channel.dc_column())];
                let base = channel.band0_rest_base();
                names.extend((0..BAND0_REST).map(|k| format!("f_rest_{}", base + k)));
                names
            }
            ExtractionTask::HigherBand(channel, band) => {
                let base = channel.higher_rest_base() + band.index() * COEFFS_PER_HIGHER_BAND;
                (0..COEFFS_PER_HIGHER_BAND)
                    .map(|k| format!("f_rest_{}", base + k))
                    .collect()
            }
        }
    }
}

/// Every column name the loader queries, deduplicated, in plan order.
pub fn required_columns() -> Vec<String> {
    let mut names = Vec::new();
    for task in EXTRACTION_PLAN {
        for name in task.column_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band0_uses_fixed_rest_slots() {
        assert_eq!(
            ExtractionTask::Band0(ColorChannel::R).column_names(),
            vec!["f_dc_0", "f_rest_0", "f_rest_1", "f_rest_2"]
        );
        assert_eq!(
            ExtractionTask::Band0(ColorChannel::G).column_names(),
            vec!["f_dc_1", "f_rest_15", "f_rest_16", "f_rest_17"]
        );
        assert_eq!(
            ExtractionTask::Band0(ColorChannel::B).column_names(),
            vec!["f_dc_2", "f_rest_30", "f_rest_31", "f_rest_32"]
        );
    }

    #[test]
    fn higher_band_offsets() {
        assert_eq!(
            ExtractionTask::HigherBand(ColorChannel::R, ShBand::One).column_names(),
            vec!["f_rest_3", "f_rest_4", "f_rest_5", "f_rest_6"]
        );
        assert_eq!(
            ExtractionTask::HigherBand(ColorChannel::G, ShBand::Two).column_names(),
            vec!["f_rest_22", "f_rest_23", "f_rest_24", "f_rest_25"]
        );
        assert_eq!(
            ExtractionTask::HigherBand(ColorChannel::B, ShBand::Three).column_names(),
            vec!["f_rest_41", "f_rest_42", "f_rest_43", "f_rest_44"]
        );
    }

    #[test]
    fn plan_covers_every_rest_column_once() {
        let names = required_columns();
        for k in 0..REST_COLUMN_COUNT {
            assert!(names.contains(&format!("f_rest_{k}")), "f_rest_{k} unused");
        }
        let total: usize = EXTRACTION_PLAN.iter().map(|t| t.column_names().len()).sum();
        assert_eq!(total, names.len());
        // x,y,z,opacity + 4 rot + 3 scale + 3 dc + 45 rest
        assert_eq!(names.len(), 4 + 4 + 3 + 3 + REST_COLUMN_COUNT);
    }
}
