/**
 * Number of samples the moving average is taken over.
 */
pub const SMOOTHING_WINDOW: usize = 8;

/// Moving average over the last `SMOOTHING_WINDOW` samples of one channel.
///
/// The window starts out filled with zeros, so the first seven averages are biased towards
/// zero. The average is the integer sum divided by the window size, truncated towards zero.
#[derive(Debug, Clone)]
pub struct MovingAverageFilter {
    samples: [i16; SMOOTHING_WINDOW],
    // slot holding the oldest sample, the next one to be evicted
    oldest: usize,
    sum: i32,
}

impl MovingAverageFilter {
    pub fn new() -> Self {
        MovingAverageFilter {
            samples: [0; SMOOTHING_WINDOW],
            oldest: 0,
            sum: 0,
        }
    }

    /// Evicts the oldest sample, appends `value` and returns the new average.
    pub fn push(&mut self, value: i16) -> i16 {
        self.sum -= i32::from(self.samples[self.oldest]);
        self.sum += i32::from(value);
        self.samples[self.oldest] = value;
        self.oldest = (self.oldest + 1) % SMOOTHING_WINDOW;

        self.average()
    }

    pub fn average(&self) -> i16 {
        // the mean of i16 values always fits in an i16
        (self.sum / SMOOTHING_WINDOW as i32) as i16
    }

    /// The window contents, oldest sample first.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.samples[self.oldest..]
            .iter()
            .chain(self.samples[..self.oldest].iter())
            .copied()
    }

    pub fn reset(&mut self) {
        *self = MovingAverageFilter::new();
    }
}

impl Default for MovingAverageFilter {
    fn default() -> Self {
        MovingAverageFilter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_is_biased_towards_zero() {
        let mut filter = MovingAverageFilter::new();

        assert_eq!(filter.push(800), 100);
        for _ in 0..7 {
            filter.push(0);
        }
        assert_eq!(filter.average(), 100);

        // the ninth push evicts the 800
        assert_eq!(filter.push(0), 0);
    }

    #[test]
    fn full_window_is_the_mean_of_the_last_eight() {
        let mut filter = MovingAverageFilter::new();
        let values = [10, 20, 30, 40, 50, 60, 70, 80];

        let mut last = 0;
        for value in values {
            last = filter.push(value);
        }
        assert_eq!(last, 45);

        // 10 is evicted
        assert_eq!(filter.push(90), (20 + 30 + 40 + 50 + 60 + 70 + 80 + 90) / 8);
        assert_eq!(filter.samples().collect::<Vec<_>>(), vec![20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn window_never_grows() {
        let mut filter = MovingAverageFilter::new();
        for value in 0..100 {
            filter.push(value);
            assert_eq!(filter.samples().count(), SMOOTHING_WINDOW);
        }
    }

    #[test]
    fn division_truncates_towards_zero() {
        let mut filter = MovingAverageFilter::new();
        assert_eq!(filter.push(-15), -1);
        assert_eq!(filter.push(7), -1);
        assert_eq!(filter.push(1), 0);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let mut filter = MovingAverageFilter::new();
        for _ in 0..SMOOTHING_WINDOW {
            filter.push(i16::MIN);
        }
        assert_eq!(filter.average(), i16::MIN);

        filter.reset();
        assert_eq!(filter.average(), 0);
    }
}
