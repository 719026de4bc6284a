//! Template matching against screen captures.
//!
//! Scores are zero-mean normalized cross-correlation (ZNCC) in `[-1, 1]`, so
//! a uniformly bright region does not look like a match. The cross term
//! comes from `imageproc`; window sums come from summed-area tables.
//!
//! Large searches run coarse-to-fine. Screen and template are shrunk by the
//! same integer factor, the best coarse placements are collected, and each
//! one is re-scored at full resolution in a small neighbourhood. The
//! reported score and region are always the full-resolution ones.

use std::path::Path;

use anyhow::Result;
use image::GrayImage;
use imageproc::template_matching::{match_template, MatchTemplateMethod};

use crate::{Image, Match, OwnedImage, Region};

/// Short side (in px) a template keeps after shrinking.
const MIN_COARSE_SIDE: u32 = 4;
const MAX_COARSE: u32 = 8;
/// Placements x template pixels one coarse pass may cost.
const COARSE_BUDGET: f64 = 1e7;
/// Coarse peaks re-scored at full resolution.
const MAX_CANDIDATES: usize = 8;
/// Coarse peaks closer than this (in coarse px) count as one.
const PEAK_SPACING: u32 = 2;

/// A registered template.
#[derive(Debug, Clone)]
pub struct Template {
    width: u32,
    height: u32,
    image: OwnedImage,
    full: Patch,
}

impl Template {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_image(OwnedImage::open(path)?)
    }

    pub fn from_image(image: OwnedImage) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        anyhow::ensure!(width > 0 && height > 0, "template is empty");

        let full = Patch::new(image.as_image().to_gray_image());
        Ok(Self {
            width,
            height,
            image,
            full,
        })
    }

    /// Best-scoring location on `screen`, regardless of threshold.
    ///
    /// `None` when the template cannot be placed at all: it is larger than
    /// the screen or has no contrast.
    pub fn best_match(&self, screen: Image) -> Result<Option<Match>> {
        if self.full.variance() <= f64::EPSILON {
            return Ok(None);
        }
        if screen.width() < self.width || screen.height() < self.height {
            return Ok(None);
        }

        let Some((factor, coarse)) = self.coarse(screen.width(), screen.height())? else {
            return Ok(self.full.best(&screen.to_gray_image()).map(|hit| self.to_match(hit)));
        };

        let small = screen.to_owned_image().downscaled(factor)?.as_image().to_gray_image();
        let mut best: Option<(u32, u32, f64)> = None;
        for (cx, cy) in peaks(coarse.scores(&small), MAX_CANDIDATES) {
            let x0 = (cx * factor).saturating_sub(factor);
            let y0 = (cy * factor).saturating_sub(factor);
            let around = screen
                .sub_image(x0, y0, self.width + 2 * factor, self.height + 2 * factor)
                .to_gray_image();

            if let Some((x, y, score)) = self.full.best(&around)
                && best.is_none_or(|(_, _, b)| score > b)
            {
                best = Some((x0 + x, y0 + y, score));
            }
        }

        Ok(best.map(|hit| self.to_match(hit)))
    }

    /// Shrink factor for a `screen_w` x `screen_h` search.
    ///
    /// The smallest factor whose coarse pass fits `COARSE_BUDGET`, capped so
    /// the template keeps `MIN_COARSE_SIDE` px on its short side.
    fn coarse_factor(&self, screen_w: u32, screen_h: u32) -> u32 {
        let max = (self.width.min(self.height) / MIN_COARSE_SIDE).clamp(1, MAX_COARSE);
        let work = screen_w as f64 * screen_h as f64 * self.width as f64 * self.height as f64;
        (1..=max)
            .find(|&f| work / (f as f64).powi(4) <= COARSE_BUDGET)
            .unwrap_or(max)
    }

    /// The shrunk template for a coarse pass, or `None` to search at full resolution.
    ///
    /// Falls back to smaller factors while shrinking washes out all contrast.
    fn coarse(&self, screen_w: u32, screen_h: u32) -> Result<Option<(u32, Patch)>> {
        let mut factor = self.coarse_factor(screen_w, screen_h);
        while factor > 1 {
            let small = self.image.clone().downscaled(factor)?;
            let patch = Patch::new(small.as_image().to_gray_image());
            if patch.variance() > f64::EPSILON {
                return Ok(Some((factor, patch)));
            }
            factor -= 1;
        }
        Ok(None)
    }

    fn to_match(&self, (x, y, score): (u32, u32, f64)) -> Match {
        Match {
            score: score.clamp(-1.0, 1.0) as f32,
            region: Some(Region {
                x,
                y,
                width: self.width,
                height: self.height,
            }),
        }
    }
}

/// Grayscale pixels plus the sums ZNCC needs.
#[derive(Debug, Clone)]
struct Patch {
    gray: GrayImage,
    sum: f64,
    sum_sq: f64,
}

impl Patch {
    fn new(gray: GrayImage) -> Self {
        let (sum, sum_sq) = gray.pixels().fold((0.0, 0.0), |(s, sq), p| {
            let v = p.0[0] as f64;
            (s + v, sq + v * v)
        });
        Self { gray, sum, sum_sq }
    }

    fn len(&self) -> f64 {
        (self.gray.width() * self.gray.height()) as f64
    }

    fn variance(&self) -> f64 {
        self.sum_sq - self.sum * self.sum / self.len()
    }

    /// ZNCC at every placement on `screen`. Flat windows are skipped.
    fn scores(&self, screen: &GrayImage) -> Vec<(u32, u32, f64)> {
        let (tw, th) = self.gray.dimensions();
        if screen.width() < tw || screen.height() < th {
            return Vec::new();
        }

        let n = self.len();
        let tpl_var = self.variance();
        let cross = match_template(screen, &self.gray, MatchTemplateMethod::CrossCorrelation);
        let table = SummedArea::new(screen);

        cross
            .enumerate_pixels()
            .filter_map(|(x, y, p)| {
                let (win_sum, win_sq) = table.window(x, y, tw, th);
                let win_var = win_sq - win_sum * win_sum / n;
                (win_var > f64::EPSILON).then(|| {
                    let score = (p.0[0] as f64 - win_sum * self.sum / n) / (win_var * tpl_var).sqrt();
                    (x, y, score)
                })
            })
            .collect()
    }

    fn best(&self, screen: &GrayImage) -> Option<(u32, u32, f64)> {
        self.scores(screen)
            .into_iter()
            .reduce(|best, hit| if hit.2 > best.2 { hit } else { best })
    }
}

/// Up to `limit` highest-scoring placements, at least `PEAK_SPACING` apart.
fn peaks(mut scores: Vec<(u32, u32, f64)>, limit: usize) -> Vec<(u32, u32)> {
    scores.sort_unstable_by(|a, b| b.2.total_cmp(&a.2));

    let mut picked: Vec<(u32, u32)> = Vec::with_capacity(limit);
    for (x, y, _) in scores {
        if picked.len() == limit {
            break;
        }
        if picked
            .iter()
            .all(|&(px, py)| px.abs_diff(x) > PEAK_SPACING || py.abs_diff(y) > PEAK_SPACING)
        {
            picked.push((x, y));
        }
    }
    picked
}

/// Summed-area tables of pixel values and squared pixel values.
#[derive(Debug, Clone)]
struct SummedArea {
    stride: usize,
    sum: Vec<u64>,
    sum_sq: Vec<u64>,
}

impl SummedArea {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sum_sq = vec![0u64; stride * (h + 1)];

        for y in 0..h {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = image.get_pixel(x as u32, y as u32).0[0] as u64;
                row += v;
                row_sq += v * v;
                let i = (y + 1) * stride + x + 1;
                sum[i] = sum[i - stride] + row;
                sum_sq[i] = sum_sq[i - stride] + row_sq;
            }
        }

        Self { stride, sum, sum_sq }
    }

    /// Sum and squared sum of the `w` x `h` window with top-left corner `(x, y)`.
    fn window(&self, x: u32, y: u32, w: u32, h: u32) -> (f64, f64) {
        let (x, y, w, h) = (x as usize, y as usize, w as usize, h as usize);
        let at = |table: &[u64]| {
            let a = table[y * self.stride + x];
            let b = table[y * self.stride + x + w];
            let c = table[(y + h) * self.stride + x];
            let d = table[(y + h) * self.stride + x + w];
            (d + a - b - c) as f64
        };
        (at(&self.sum), at(&self.sum_sq))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;
    use crate::Color;

    fn hash(x: u32, y: u32) -> u8 {
        let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
        h ^= h >> 15;
        h = h.wrapping_mul(0x2C1B_3C6D);
        h ^= h >> 12;
        (h & 0xff) as u8
    }

    fn noise(width: u32, height: u32) -> OwnedImage {
        OwnedImage::from_fn(width, height, |x, y| Color::gray(hash(x, y)))
    }

    /// Noise made of `block` x `block` flat tiles, like the flat areas of a UI.
    fn blocky(width: u32, height: u32, block: u32) -> OwnedImage {
        OwnedImage::from_fn(width, height, |x, y| Color::gray(hash(x / block, y / block)))
    }

    fn crop(screen: &OwnedImage, x: u32, y: u32, width: u32, height: u32) -> Template {
        Template::from_image(screen.as_image().sub_image(x, y, width, height).to_owned_image()).unwrap()
    }

    fn find(template: &Template, screen: &OwnedImage, threshold: f32) -> Option<Match> {
        template
            .best_match(screen.as_image())
            .unwrap()
            .filter(|m| m.score >= threshold)
    }

    fn region(x: u32, y: u32, width: u32, height: u32) -> Option<Region> {
        Some(Region { x, y, width, height })
    }

    #[test]
    fn summed_area_window_matches_brute_force() {
        let img = noise(13, 9).as_image().to_gray_image();
        let table = SummedArea::new(&img);

        let (mut sum, mut sq) = (0.0, 0.0);
        for y in 2..7 {
            for x in 3..11 {
                let v = img.get_pixel(x, y).0[0] as f64;
                sum += v;
                sq += v * v;
            }
        }
        assert_eq!(table.window(3, 2, 8, 5), (sum, sq));
    }

    #[test]
    fn peaks_keep_distinct_maxima() {
        let scores = vec![(10, 10, 0.9), (11, 10, 0.85), (40, 3, 0.8), (10, 12, 0.7), (0, 0, 0.1)];
        assert_eq!(peaks(scores, 2), vec![(10, 10), (40, 3)]);
    }

    #[test]
    fn finds_exact_crop_at_its_location() {
        let screen = noise(120, 80);
        let template = crop(&screen, 37, 21, 24, 20);
        assert_eq!(template.coarse_factor(120, 80), 1);

        let found = find(&template, &screen, 0.7).unwrap();
        assert!(found.score > 0.99, "score {}", found.score);
        assert_eq!(found.region, region(37, 21, 24, 20));
    }

    #[test]
    fn large_template_is_located_exactly_after_coarse_pass() {
        let screen = blocky(640, 360, 16);
        let template = crop(&screen, 160, 96, 96, 64);
        assert_eq!(template.coarse_factor(640, 360), 4);

        let found = find(&template, &screen, 0.7).unwrap();
        assert!(found.score > 0.99, "score {}", found.score);
        assert_eq!(found.region, region(160, 96, 96, 64));
    }

    #[test]
    fn wide_and_odd_sized_crops_match_at_their_origin() {
        // Sizes that do not divide by the shrink factor used to drift apart
        // from the screen once both were shrunk.
        let screen = blocky(1280, 720, 16);
        for (w, h) in [(300, 35), (120, 79)] {
            let template = crop(&screen, 301, 203, w, h);
            assert!(template.coarse_factor(1280, 720) > 1);

            let found = find(&template, &screen, 0.7).unwrap_or_else(|| panic!("{w}x{h} not found"));
            assert!(found.score > 0.99, "{w}x{h} score {}", found.score);
            assert_eq!(found.region, region(301, 203, w, h));
        }
    }

    #[test]
    fn full_hd_search_fits_in_one_waiting_period() {
        let screen = blocky(1920, 1080, 6);
        let template = crop(&screen, 1001, 517, 80, 30);

        let start = Instant::now();
        let found = template.best_match(screen.as_image()).unwrap().unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
        assert!(found.score > 0.99, "score {}", found.score);
        assert_eq!(found.region, region(1001, 517, 80, 30));
    }

    #[test]
    fn unrelated_pattern_stays_below_threshold() {
        let screen = noise(120, 80);
        let other = OwnedImage::from_fn(24, 20, |x, y| Color::gray(hash(x + 5000, y + 7000)));
        let template = Template::from_image(other).unwrap();

        assert!(find(&template, &screen, 0.7).is_none());
    }

    #[test]
    fn template_larger_than_screen_is_not_found() {
        let screen = noise(20, 20);
        let template = Template::from_image(noise(30, 10)).unwrap();
        assert!(template.best_match(screen.as_image()).unwrap().is_none());
    }

    #[test]
    fn flat_template_never_matches() {
        let screen = OwnedImage::from_fn(50, 50, |_, _| Color::WHITE);
        let template = Template::from_image(OwnedImage::from_fn(10, 10, |_, _| Color::WHITE)).unwrap();
        assert!(template.best_match(screen.as_image()).unwrap().is_none());
    }

    #[test]
    fn template_that_washes_out_when_shrunk_falls_back_to_full_resolution() {
        // A one-pixel checkerboard averages to flat gray at factor 2.
        let screen = OwnedImage::from_fn(400, 300, |x, y| {
            if (200..232).contains(&x) && (100..132).contains(&y) {
                Color::gray(if (x + y) % 2 == 0 { 0 } else { 255 })
            } else {
                Color::gray(hash(x, y) / 4)
            }
        });
        let template = crop(&screen, 200, 100, 32, 32);
        assert_eq!(template.coarse_factor(400, 300), 2);
        assert!(template.coarse(400, 300).unwrap().is_none());

        let found = find(&template, &screen, 0.7).unwrap();
        assert_eq!(found.region, region(200, 100, 32, 32));
    }
}
