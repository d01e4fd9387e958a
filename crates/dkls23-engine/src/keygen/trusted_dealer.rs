//! Trusted dealer
//!
//! Splits an existing secret key into key shares, for importing keys and
//! for tests that need shares without running DKG.

use std::collections::BTreeMap;

use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand_core::CryptoRngCore;
use zeroize::Zeroize;

use crate::key_share::KeyShare;
use crate::primitives::{zero_share::pair_seed, Polynomial};
use crate::types::{point_to_bytes, Parameters, PartyIndex, SessionId};
use crate::{Error, Result};

/// Split `secret_key` into `share_count` key shares.
///
/// `session_id` takes the place of the DKG session id in the shares.
/// Without a `chain_code` a random one is sampled.
pub fn split_secret<R: CryptoRngCore>(
    rng: &mut R,
    parameters: Parameters,
    session_id: SessionId,
    secret_key: &Scalar,
    chain_code: Option<[u8; 32]>,
) -> Result<Vec<KeyShare>> {
    parameters.validate()?;
    if bool::from(secret_key.is_zero()) {
        return Err(Error::InvalidParameters("secret key is zero".into()));
    }
    let chain_code = chain_code.unwrap_or_else(|| {
        let mut sampled = [0u8; 32];
        rng.fill_bytes(&mut sampled);
        sampled
    });

    let mut coefficients = vec![*secret_key];
    coefficients.extend((1..parameters.threshold).map(|_| Scalar::random(&mut *rng)));
    let polynomial = Polynomial::from_coefficients(coefficients);

    let secret_shares: BTreeMap<PartyIndex, Scalar> = parameters
        .parties()
        .map(|j| (j, polynomial.evaluate_at(j)))
        .collect();
    let public_shares: BTreeMap<PartyIndex, Vec<u8>> = secret_shares
        .iter()
        .map(|(j, s)| (*j, point_to_bytes(&(ProjectivePoint::GENERATOR * s))))
        .collect();
    let public_key = point_to_bytes(&(ProjectivePoint::GENERATOR * secret_key));

    let ot_secrets: BTreeMap<PartyIndex, Scalar> = parameters
        .parties()
        .map(|j| (j, Scalar::random(&mut *rng)))
        .collect();
    let ot_public_keys: BTreeMap<PartyIndex, Vec<u8>> = ot_secrets
        .iter()
        .map(|(j, s)| (*j, point_to_bytes(&(ProjectivePoint::GENERATOR * s))))
        .collect();

    // one contribution per ordered pair, combined like in DKG
    let mut contributions: BTreeMap<(PartyIndex, PartyIndex), [u8; 32]> = BTreeMap::new();
    for i in parameters.parties() {
        for j in parameters.parties().filter(|j| *j != i) {
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            contributions.insert((i, j), seed);
        }
    }

    let mut shares = Vec::with_capacity(usize::from(parameters.share_count));
    for (&i, secret_share) in &secret_shares {
        let mut zero_seeds = BTreeMap::new();
        for j in parameters.parties().filter(|j| *j != i) {
            let (Some(mine), Some(theirs)) = (contributions.get(&(i, j)), contributions.get(&(j, i))) else {
                return Err(Error::primitive("zero seed"));
            };
            zero_seeds.insert(j, pair_seed(i, mine, j, theirs));
        }
        let ot_secret = ot_secrets
            .get(&i)
            .copied()
            .ok_or_else(|| Error::primitive("OT key"))?;
        shares.push(KeyShare {
            party_index: i,
            parameters,
            secret_share: *secret_share,
            public_key: public_key.clone(),
            public_shares: public_shares.clone(),
            chain_code,
            depth: 0,
            child_number: 0,
            parent_fingerprint: [0u8; 4],
            dkg_session_id: session_id,
            zero_seeds,
            ot_secret,
            ot_public_keys: ot_public_keys.clone(),
        });
    }

    for seed in contributions.values_mut() {
        seed.zeroize();
    }
    Ok(shares)
}

/// Shares of a fresh random key, with random session id and chain code
pub fn mock_keygen<R: CryptoRngCore>(rng: &mut R, parameters: Parameters) -> Result<Vec<KeyShare>> {
    let mut secret_key = Scalar::random(&mut *rng);
    let mut session_id = [0u8; 32];
    rng.fill_bytes(&mut session_id);
    let shares = split_secret(rng, parameters, session_id, &secret_key, None);
    secret_key.zeroize();
    shares
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::polynomial::interpolate_at_zero;
    use rand_chacha::ChaCha20Rng;
    use rand_core::SeedableRng;

    #[test]
    fn shares_interpolate_to_the_secret() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let secret = Scalar::random(&mut rng);
        let params = Parameters::new(3, 5).unwrap();
        let shares = split_secret(&mut rng, params, [1u8; 32], &secret, Some([2u8; 32])).unwrap();
        assert_eq!(shares.len(), 5);

        for subset in [[1u16, 2, 3], [2, 4, 5], [1, 3, 5]] {
            let points: Vec<_> = subset
                .iter()
                .map(|&j| (j, shares[usize::from(j) - 1].secret_share))
                .collect();
            assert_eq!(interpolate_at_zero(&points), Some(secret));
        }
        for share in &shares {
            share.validate().unwrap();
            assert_eq!(share.chain_code, [2u8; 32]);
            assert_eq!(
                share.public_key_point().unwrap(),
                ProjectivePoint::GENERATOR * secret
            );
        }
    }

    #[test]
    fn same_seed_gives_same_shares() {
        let params = Parameters::new(2, 3).unwrap();
        let a = mock_keygen(&mut ChaCha20Rng::seed_from_u64(1), params).unwrap();
        let b = mock_keygen(&mut ChaCha20Rng::seed_from_u64(1), params).unwrap();
        assert_eq!(a[0].public_key, b[0].public_key);
        assert_eq!(a[1].secret_share, b[1].secret_share);
    }

    #[test]
    fn missing_chain_code_is_sampled() {
        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let secret = Scalar::random(&mut rng);
        let params = Parameters::new(2, 2).unwrap();
        let a = split_secret(&mut rng, params, [1u8; 32], &secret, None).unwrap();
        let b = split_secret(&mut rng, params, [1u8; 32], &secret, None).unwrap();
        assert_eq!(a[0].chain_code, a[1].chain_code);
        assert_ne!(a[0].chain_code, [0u8; 32]);
        assert_ne!(a[0].chain_code, b[0].chain_code);
        assert_eq!(a[0].public_key, b[0].public_key);
    }

    #[test]
    fn zero_seeds_are_pairwise_equal() {
        let params = Parameters::new(2, 3).unwrap();
        let shares = mock_keygen(&mut ChaCha20Rng::seed_from_u64(3), params).unwrap();
        assert_eq!(shares[0].zero_seeds[&2], shares[1].zero_seeds[&1]);
        assert_eq!(shares[1].zero_seeds[&3], shares[2].zero_seeds[&2]);
    }

    #[test]
    fn zero_secret_is_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        let params = Parameters::new(1, 1).unwrap();
        assert!(matches!(
            split_secret(&mut rng, params, [0u8; 32], &Scalar::ZERO, None),
            Err(Error::InvalidParameters(_))
        ));
    }
}
