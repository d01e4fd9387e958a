//! Shamir polynomials, Feldman commitments and Lagrange interpolation

use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::types::{index_scalar, point_from_bytes, point_to_bytes, PartyIndex};

/// Secret polynomial of degree `threshold - 1`
pub struct Polynomial {
    coefficients: Vec<Scalar>,
}

impl Polynomial {
    /// Random polynomial with `threshold` coefficients
    pub fn random(threshold: u16) -> Self {
        let constant = Scalar::random(&mut OsRng);
        Self::with_constant(constant, threshold)
    }

    /// Random polynomial with a fixed constant term
    pub fn with_constant(constant: Scalar, threshold: u16) -> Self {
        let mut coefficients = Vec::with_capacity(usize::from(threshold));
        coefficients.push(constant);
        for _ in 1..threshold {
            coefficients.push(Scalar::random(&mut OsRng));
        }
        Self { coefficients }
    }

    /// Polynomial with the given coefficients, constant term first
    pub fn from_coefficients(coefficients: Vec<Scalar>) -> Self {
        Self { coefficients }
    }

    /// Evaluate at `x` (Horner's rule)
    pub fn evaluate(&self, x: &Scalar) -> Scalar {
        self.coefficients
            .iter()
            .rev()
            .fold(Scalar::ZERO, |acc, coef| acc * x + coef)
    }

    /// Share for a party: `f(index)`
    pub fn evaluate_at(&self, party: PartyIndex) -> Scalar {
        self.evaluate(&index_scalar(party))
    }

    pub fn constant(&self) -> &Scalar {
        &self.coefficients[0]
    }

    pub fn coefficients(&self) -> &[Scalar] {
        &self.coefficients
    }

    /// Feldman commitment `[a_k·G]`
    pub fn commit(&self) -> FeldmanCommitment {
        FeldmanCommitment(
            self.coefficients
                .iter()
                .map(|coef| ProjectivePoint::GENERATOR * coef)
                .collect(),
        )
    }
}

impl Drop for Polynomial {
    fn drop(&mut self) {
        self.coefficients.zeroize();
    }
}

/// Public commitments to the coefficients of a [`Polynomial`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeldmanCommitment(Vec<ProjectivePoint>);

impl FeldmanCommitment {
    pub fn from_points(points: Vec<ProjectivePoint>) -> Self {
        Self(points)
    }

    /// Decode wire points; `None` if any is not on the curve
    pub fn from_bytes(points: &[Vec<u8>]) -> Option<Self> {
        points
            .iter()
            .map(|bytes| point_from_bytes(bytes))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }

    pub fn to_bytes(&self) -> Vec<Vec<u8>> {
        self.0.iter().map(point_to_bytes).collect()
    }

    pub fn points(&self) -> &[ProjectivePoint] {
        &self.0
    }

    /// Number of coefficients, i.e. the threshold
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Commitment to the constant term, `f(0)·G`
    pub fn constant_term(&self) -> ProjectivePoint {
        self.0.first().copied().unwrap_or(ProjectivePoint::IDENTITY)
    }

    /// `f(index)·G` computed from the commitments alone
    pub fn evaluate_at(&self, party: PartyIndex) -> ProjectivePoint {
        let x = index_scalar(party);
        self.0
            .iter()
            .rev()
            .fold(ProjectivePoint::IDENTITY, |acc, point| acc * x + point)
    }

    /// Check that `share = f(index)`
    pub fn verify_share(&self, party: PartyIndex, share: &Scalar) -> bool {
        ProjectivePoint::GENERATOR * share == self.evaluate_at(party)
    }
}

/// Lagrange coefficient at zero for `party` within `set`.
///
/// `None` if `party` is not in `set` or the set has duplicates.
pub fn lagrange_coefficient(party: PartyIndex, set: &[PartyIndex]) -> Option<Scalar> {
    if !set.contains(&party) || has_duplicates(set) {
        return None;
    }
    let i = index_scalar(party);
    let mut numerator = Scalar::ONE;
    let mut denominator = Scalar::ONE;
    for &other in set.iter().filter(|&&other| other != party) {
        let j = index_scalar(other);
        numerator *= j;
        denominator *= j - i;
    }
    Option::<Scalar>::from(denominator.invert()).map(|inv| numerator * inv)
}

fn has_duplicates(set: &[PartyIndex]) -> bool {
    let mut sorted = set.to_vec();
    sorted.sort_unstable();
    sorted.windows(2).any(|pair| pair[0] == pair[1])
}

/// Reconstruct `f(0)` from shares `(index, f(index))`
pub fn interpolate_at_zero(shares: &[(PartyIndex, Scalar)]) -> Option<Scalar> {
    let set: Vec<PartyIndex> = shares.iter().map(|(index, _)| *index).collect();
    shares.iter().try_fold(Scalar::ZERO, |acc, (index, share)| {
        lagrange_coefficient(*index, &set).map(|lambda| acc + lambda * share)
    })
}
