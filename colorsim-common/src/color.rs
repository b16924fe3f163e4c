use rand::Rng;

/// RGB color with each channel in [0, 1].
#[derive(Copy, Clone, Default, Debug, PartialEq)]
pub struct Color {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Color {
    #[inline(always)]
    pub fn new(red: f64, green: f64, blue: f64) -> Self { Self { red, green, blue } }
    #[inline(always)]
    pub fn black() -> Self { Self::new(0.0, 0.0, 0.0) }

    /// Draws every channel independently and uniformly from [0, 1).
    pub fn random_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::new(rng.random::<f64>(), rng.random::<f64>(), rng.random::<f64>())
    }

    /// Same as [`Color::random_with`] using the thread-local generator.
    pub fn random() -> Self {
        Self::random_with(&mut rand::rng())
    }

    /// Componentwise mean. `None` for an empty input, since there is no
    /// meaningful average of zero colors.
    pub fn average<'a, I>(colors: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Color>,
    {
        let mut sum = Color::black();
        let mut count = 0usize;
        for c in colors {
            sum.red += c.red;
            sum.green += c.green;
            sum.blue += c.blue;
            count += 1;
        }
        if count == 0 {
            return None;
        }
        let n = count as f64;
        Some(Self::new(sum.red / n, sum.green / n, sum.blue / n))
    }

    /// Perceived brightness (Rec. 601 weights).
    #[inline(always)]
    pub fn luminance(self) -> f64 { 0.299 * self.red + 0.587 * self.green + 0.114 * self.blue }

    #[inline(always)]
    pub fn is_valid(self) -> bool {
        [self.red, self.green, self.blue].iter().all(|c| (0.0..=1.0).contains(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_random_color_in_unit_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            assert!(Color::random_with(&mut rng).is_valid());
        }
        assert!(Color::random().is_valid());
    }

    #[test]
    fn test_average_of_empty_is_none() {
        let empty: Vec<Color> = Vec::new();
        assert_eq!(Color::average(&empty), None);
    }

    #[test]
    fn test_average_of_four_neighbors() {
        let colors = [
            Color::new(1.0, 0.0, 0.0),
            Color::new(0.0, 1.0, 0.0),
            Color::new(0.0, 0.0, 1.0),
            Color::new(1.0, 1.0, 1.0),
        ];
        let avg = Color::average(&colors).unwrap();
        assert_eq!(avg, Color::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn test_luminance_bounds() {
        assert_eq!(Color::black().luminance(), 0.0);
        assert!((Color::new(1.0, 1.0, 1.0).luminance() - 1.0).abs() < 1e-12);
    }

    fn channel() -> impl Strategy<Value = f64> {
        0.0f64..=1.0
    }

    fn color() -> impl Strategy<Value = Color> {
        (channel(), channel(), channel()).prop_map(|(r, g, b)| Color::new(r, g, b))
    }

    proptest! {
        #[test]
        fn test_average_is_channel_mean(colors in prop::collection::vec(color(), 1..16)) {
            let avg = Color::average(&colors).unwrap();
            let n = colors.len() as f64;
            let red = colors.iter().map(|c| c.red).sum::<f64>() / n;
            let green = colors.iter().map(|c| c.green).sum::<f64>() / n;
            let blue = colors.iter().map(|c| c.blue).sum::<f64>() / n;
            prop_assert!((avg.red - red).abs() < 1e-12);
            prop_assert!((avg.green - green).abs() < 1e-12);
            prop_assert!((avg.blue - blue).abs() < 1e-12);
            prop_assert!(avg.is_valid());
        }
    }
}
