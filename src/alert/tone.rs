use std::f32::consts::PI;

const SAMPLE_RATE: u32 = 44100;

/// Two-tone alarm: alternating high/low beeps separated by short gaps,
/// repeating until the sink is stopped.
pub struct AlarmTone {
    sample_rate: u32,
    num_sample: u64,
    high_freq: f32,
    low_freq: f32,
    beep_samples: u64,
    gap_samples: u64,
    volume: f32,
}

impl AlarmTone {
    pub fn new(volume: f32) -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            num_sample: 0,
            high_freq: 960.0,
            low_freq: 770.0,
            beep_samples: u64::from(SAMPLE_RATE) * 35 / 100,
            gap_samples: u64::from(SAMPLE_RATE) * 15 / 100,
            volume: volume.clamp(0.0, 1.0),
        }
    }

    fn cycle_samples(&self) -> u64 {
        2 * (self.beep_samples + self.gap_samples)
    }
}

impl Iterator for AlarmTone {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let position = self.num_sample % self.cycle_samples();
        let half = self.beep_samples + self.gap_samples;
        self.num_sample = self.num_sample.wrapping_add(1);

        let (freq, offset) = if position < half {
            (self.high_freq, position)
        } else {
            (self.low_freq, position - half)
        };

        if offset >= self.beep_samples {
            return Some(0.0);
        }

        let t = offset as f32 / self.sample_rate as f32;
        // Short linear fade at both ends to avoid clicks.
        let fade_len = (self.sample_rate / 200) as f32;
        let from_end = (self.beep_samples - offset) as f32;
        let envelope = (offset as f32 / fade_len).min(from_end / fade_len).min(1.0);

        Some((2.0 * PI * freq * t).sin() * envelope * self.volume * 0.5)
    }
}

#[cfg(feature = "sound")]
impl rodio::Source for AlarmTone {
    fn current_frame_len(&self) -> Option<usize> {
        None // Infinite stream
    }

    fn channels(&self) -> u16 {
        1
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<std::time::Duration> {
        None
    }
}
