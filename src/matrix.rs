//! Affine display-transform support
//!
//! Standard 2D transform components in CSS ordering: a point `(x, y)` maps to
//! `(a·x + c·y + e, b·x + d·y + f)`. The crop engine synthesizes one of these
//! from the viewport state and, independently, parses the one actually
//! applied to the previewed image; the two derivations cross-validate each
//! other at confirm time.

use egui::Pos2;
use serde::{Deserialize, Serialize};

/// Determinants smaller than this are treated as singular (non-invertible)
pub const DET_EPSILON: f32 = 1e-6;

/// A 2D affine transform `{a, b, c, d, e, f}`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AffineMatrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl AffineMatrix {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// Parse a CSS-style transform value.
    ///
    /// Accepts `matrix(a, b, c, d, e, f)` and `matrix3d(...)` (16 values,
    /// reading the m11/m12/m21/m22/m41/m42 components of the column-major
    /// layout). Anything else, including `none`, yields `None`.
    pub fn parse_css(value: &str) -> Option<Self> {
        let value = value.trim();
        let (name, rest) = value.split_once('(')?;
        let body = rest.strip_suffix(')')?;
        let nums: Vec<f32> = body
            .split(',')
            .map(|component| component.trim().parse::<f32>())
            .collect::<Result<_, _>>()
            .ok()?;

        match name.trim() {
            "matrix" if nums.len() == 6 => Some(Self {
                a: nums[0],
                b: nums[1],
                c: nums[2],
                d: nums[3],
                e: nums[4],
                f: nums[5],
            }),
            "matrix3d" if nums.len() == 16 => Some(Self {
                a: nums[0],
                b: nums[1],
                c: nums[4],
                d: nums[5],
                e: nums[12],
                f: nums[13],
            }),
            _ => None,
        }
    }

    /// Serialize as a CSS `matrix(...)` value
    pub fn to_css(&self) -> String {
        format!(
            "matrix({}, {}, {}, {}, {}, {})",
            self.a, self.b, self.c, self.d, self.e, self.f
        )
    }

    /// Determinant of the linear part
    pub fn determinant(&self) -> f32 {
        self.a * self.d - self.b * self.c
    }

    /// Invert the transform; `None` when the determinant is below
    /// [`DET_EPSILON`] in magnitude or not finite.
    pub fn invert(&self) -> Option<Self> {
        let det = self.determinant();
        if !det.is_finite() || det.abs() < DET_EPSILON {
            return None;
        }
        let inv_det = 1.0 / det;
        Some(Self {
            a: self.d * inv_det,
            b: -self.b * inv_det,
            c: -self.c * inv_det,
            d: self.a * inv_det,
            e: (self.c * self.f - self.d * self.e) * inv_det,
            f: (self.b * self.e - self.a * self.f) * inv_det,
        })
    }

    /// Map a point through the transform
    pub fn apply(&self, p: Pos2) -> Pos2 {
        Pos2::new(
            self.a * p.x + self.c * p.y + self.e,
            self.b * p.x + self.d * p.y + self.f,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_matrix() {
        let m = AffineMatrix::parse_css("matrix(0.4, 0, 0, 0.4, -80, 0)").unwrap();
        assert!((m.a - 0.4).abs() < 1e-6);
        assert!(m.b.abs() < 1e-6);
        assert!(m.c.abs() < 1e-6);
        assert!((m.d - 0.4).abs() < 1e-6);
        assert!((m.e - (-80.0)).abs() < 1e-6);
        assert!(m.f.abs() < 1e-6);
    }

    #[test]
    fn test_parse_matrix3d() {
        let m = AffineMatrix::parse_css(
            "matrix3d(2, 0, 0, 0, 0, 2, 0, 0, 0, 0, 1, 0, 10, 20, 0, 1)",
        )
        .unwrap();
        assert!((m.a - 2.0).abs() < 1e-6);
        assert!((m.d - 2.0).abs() < 1e-6);
        assert!((m.e - 10.0).abs() < 1e-6);
        assert!((m.f - 20.0).abs() < 1e-6);
    }

    #[test]
    fn test_parse_rejects_other_values() {
        assert!(AffineMatrix::parse_css("none").is_none());
        assert!(AffineMatrix::parse_css("").is_none());
        assert!(AffineMatrix::parse_css("translate(10px, 20px)").is_none());
        assert!(AffineMatrix::parse_css("matrix(1, 2, 3)").is_none());
        assert!(AffineMatrix::parse_css("matrix(a, b, c, d, e, f)").is_none());
        assert!(AffineMatrix::parse_css("matrix3d(1, 2, 3, 4, 5, 6)").is_none());
    }

    #[test]
    fn test_parse_tolerates_whitespace() {
        let m = AffineMatrix::parse_css("  matrix( 1 , 0 , 0 , 1 , 4.5 , -2 )  ").unwrap();
        assert!((m.e - 4.5).abs() < 1e-6);
        assert!((m.f - (-2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_css_round_trip() {
        let m = AffineMatrix {
            a: 0.75,
            b: 0.0,
            c: 0.0,
            d: 0.75,
            e: -120.5,
            f: 33.25,
        };
        let parsed = AffineMatrix::parse_css(&m.to_css()).unwrap();
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_invert_round_trip() {
        let m = AffineMatrix {
            a: 0.4,
            b: 0.0,
            c: 0.0,
            d: 0.4,
            e: -80.0,
            f: 12.0,
        };
        let inv = m.invert().unwrap();

        let p = Pos2::new(123.0, -45.0);
        let back = inv.apply(m.apply(p));
        assert!((back.x - p.x).abs() < 1e-3);
        assert!((back.y - p.y).abs() < 1e-3);
    }

    #[test]
    fn test_invert_singular_returns_none() {
        let singular = AffineMatrix {
            a: 0.0,
            b: 0.0,
            c: 0.0,
            d: 0.0,
            e: 10.0,
            f: 10.0,
        };
        assert!(singular.invert().is_none());

        // Rank-deficient but non-zero entries
        let collinear = AffineMatrix {
            a: 1.0,
            b: 2.0,
            c: 2.0,
            d: 4.0,
            e: 0.0,
            f: 0.0,
        };
        assert!(collinear.invert().is_none());
    }

    #[test]
    fn test_identity_apply() {
        let p = Pos2::new(7.0, -3.0);
        let mapped = AffineMatrix::IDENTITY.apply(p);
        assert!((mapped.x - p.x).abs() < 1e-6);
        assert!((mapped.y - p.y).abs() < 1e-6);
    }
}
