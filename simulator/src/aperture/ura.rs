//! Uniformly redundant array (URA) coded-aperture pattern.
//!
//! The pattern is built from quadratic residues modulo a prime rank `p`:
//!
//! - row 0 is closed
//! - column 0 (below row 0) is open
//! - interior cell `(i, j)` is open iff `C(i) · C(j) == 1`, where `C(n)` is
//!   `+1` when `n` is a non-zero square mod `p` and `-1` otherwise
//!
//! For prime ranks roughly half of the cells are open.

use ndarray::Array2;

/// Default rank when an aperture does not specify one.
pub const DEFAULT_RANK: usize = 13;

fn residue_sign(n: usize, p: usize) -> i32 {
    if n == 0 {
        return 0;
    }
    if (1..p).any(|x| (x * x) % p == n) {
        1
    } else {
        -1
    }
}

/// Build the `rank × rank` open/closed grid, indexed `[row, col]`.
pub fn generate_ura(rank: usize) -> Array2<bool> {
    let residues: Vec<i32> = (0..rank).map(|n| residue_sign(n, rank)).collect();

    Array2::from_shape_fn((rank, rank), |(i, j)| match (i, j) {
        (0, _) => false,
        (_, 0) => true,
        _ => residues[i] * residues[j] == 1,
    })
}
