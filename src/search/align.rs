//! Affine-gap local alignment and Karlin-Altschul scoring.
//!
//! Each supported substitution matrix / gap-penalty combination carries its
//! precomputed λ and K parameters; asking for a combination the registry
//! does not know is a configuration error, never silently defaulted.

use std::collections::HashMap;

use serde::Serialize;

use crate::errors::{ProtseekError, Result};

/// Residue order of the substitution matrix axes.
pub const MATRIX_ALPHABET: &[u8; 24] = b"ARNDCQEGHILKMFPSTWYVBZX*";

/// BLOSUM62, row/column order per [`MATRIX_ALPHABET`].
#[rustfmt::skip]
pub const BLOSUM62: [[i32; 24]; 24] = [
    [ 4, -1, -2, -2,  0, -1, -1,  0, -2, -1, -1, -1, -1, -2, -1,  1,  0, -3, -2,  0, -2, -1,  0, -4],
    [-1,  5,  0, -2, -3,  1,  0, -2,  0, -3, -2,  2, -1, -3, -2, -1, -1, -3, -2, -3, -1,  0, -1, -4],
    [-2,  0,  6,  1, -3,  0,  0,  0,  1, -3, -3,  0, -2, -3, -2,  1,  0, -4, -2, -3,  3,  0, -1, -4],
    [-2, -2,  1,  6, -3,  0,  2, -1, -1, -3, -4, -1, -3, -3, -1,  0, -1, -4, -3, -3,  4,  1, -1, -4],
    [ 0, -3, -3, -3,  9, -3, -4, -3, -3, -1, -1, -3, -1, -2, -3, -1, -1, -2, -2, -1, -3, -3, -2, -4],
    [-1,  1,  0,  0, -3,  5,  2, -2,  0, -3, -2,  1,  0, -3, -1,  0, -1, -2, -1, -2,  0,  3, -1, -4],
    [-1,  0,  0,  2, -4,  2,  5, -2,  0, -3, -3,  1, -2, -3, -1,  0, -1, -3, -2, -2,  1,  4, -1, -4],
    [ 0, -2,  0, -1, -3, -2, -2,  6, -2, -4, -4, -2, -3, -3, -2,  0, -2, -2, -3, -3, -1, -2, -1, -4],
    [-2,  0,  1, -1, -3,  0,  0, -2,  8, -3, -3, -1, -2, -1, -2, -1, -2, -2,  2, -3,  0,  0, -1, -4],
    [-1, -3, -3, -3, -1, -3, -3, -4, -3,  4,  2, -3,  1,  0, -3, -2, -1, -3, -1,  3, -3, -3, -1, -4],
    [-1, -2, -3, -4, -1, -2, -3, -4, -3,  2,  4, -2,  2,  0, -3, -2, -1, -2, -1,  1, -4, -3, -1, -4],
    [-1,  2,  0, -1, -3,  1,  1, -2, -1, -3, -2,  5, -1, -3, -1,  0, -1, -3, -2, -2,  0,  1, -1, -4],
    [-1, -1, -2, -3, -1,  0, -2, -3, -2,  1,  2, -1,  5,  0, -2, -1, -1, -1, -1,  1, -3, -1, -1, -4],
    [-2, -3, -3, -3, -2, -3, -3, -3, -1,  0,  0, -3,  0,  6, -4, -2, -2,  1,  3, -1, -3, -3, -1, -4],
    [-1, -2, -2, -1, -3, -1, -1, -2, -2, -3, -3, -1, -2, -4,  7, -1, -1, -4, -3, -2, -2, -1, -2, -4],
    [ 1, -1,  1,  0, -1,  0,  0,  0, -1, -2, -2,  0, -1, -2, -1,  4,  1, -3, -2, -2,  0,  0,  0, -4],
    [ 0, -1,  0, -1, -1, -1, -1, -2, -2, -1, -1, -1, -1, -2, -1,  1,  5, -2, -2,  0, -1, -1,  0, -4],
    [-3, -3, -4, -4, -2, -2, -3, -2, -2, -3, -2, -3, -1,  1, -4, -3, -2, 11,  2, -3, -4, -3, -2, -4],
    [-2, -2, -2, -3, -2, -1, -2, -3,  2, -1, -1, -2, -1,  3, -3, -2, -2,  2,  7, -1, -3, -2, -1, -4],
    [ 0, -3, -3, -3, -1, -2, -2, -3, -3,  3,  1, -2,  1, -1, -2, -2,  0, -3, -1,  4, -3, -2, -1, -4],
    [-2, -1,  3,  4, -3,  0,  1, -1,  0, -3, -4,  0, -3, -3, -2,  0, -1, -4, -3, -3,  4,  1, -1, -4],
    [-1,  0,  0,  1, -3,  3,  4, -2,  0, -3, -3,  1, -1, -3, -1,  0, -1, -3, -2, -2,  1,  4, -1, -4],
    [ 0, -1, -1, -1, -2, -1, -1, -1, -1, -1, -1, -1, -1, -1, -2,  0,  0, -2, -1, -1, -1, -1, -1, -4],
    [-4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4, -4,  1],
];

/// Karlin-Altschul parameters for one matrix/gap combination.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KarlinAltschul {
    pub lambda: f64,
    pub k: f64,
}

/// Registry of known matrix / gap-penalty combinations.
pub struct MatrixRegistry {
    parameters: HashMap<(String, i32, i32), KarlinAltschul>,
}

impl MatrixRegistry {
    /// Registry preloaded with the shipped BLOSUM62 parameter sets.
    pub fn standard() -> Self {
        let mut registry = Self { parameters: HashMap::new() };
        registry.register("BLOSUM62", 11, 1, KarlinAltschul { lambda: 0.267, k: 0.041 });
        registry.register("BLOSUM62", 10, 1, KarlinAltschul { lambda: 0.243, k: 0.024 });
        registry
    }

    pub fn register(
        &mut self,
        matrix: &str,
        gap_open: i32,
        gap_extend: i32,
        parameters: KarlinAltschul,
    ) {
        self.parameters.insert((matrix.to_string(), gap_open, gap_extend), parameters);
    }

    /// Resolve a scoring scheme; unknown combinations are configuration
    /// errors.
    pub fn scheme(&self, matrix: &str, gap_open: i32, gap_extend: i32) -> Result<ScoringScheme> {
        let table = match matrix {
            "BLOSUM62" => &BLOSUM62,
            other => {
                return Err(ProtseekError::config(
                    "matrix",
                    format!("unknown substitution matrix '{}'", other),
                ))
            }
        };
        let parameters =
            self.parameters.get(&(matrix.to_string(), gap_open, gap_extend)).ok_or_else(|| {
                ProtseekError::config(
                    "matrix",
                    format!(
                        "no statistical parameters for {} with gap penalties ({}, {})",
                        matrix, gap_open, gap_extend
                    ),
                )
            })?;
        Ok(ScoringScheme {
            matrix: table,
            gap_open,
            gap_extend,
            parameters: *parameters,
            index: residue_index(),
        })
    }
}

fn residue_index() -> [usize; 256] {
    // Residues outside the matrix alphabet score as X
    let unknown = MATRIX_ALPHABET.iter().position(|&b| b == b'X').unwrap_or(22);
    let mut index = [unknown; 256];
    for (i, &aa) in MATRIX_ALPHABET.iter().enumerate() {
        index[aa as usize] = i;
    }
    index
}

/// A resolved substitution matrix plus gap penalties and statistics.
pub struct ScoringScheme {
    matrix: &'static [[i32; 24]; 24],
    gap_open: i32,
    gap_extend: i32,
    parameters: KarlinAltschul,
    index: [usize; 256],
}

impl ScoringScheme {
    pub fn score(&self, a: u8, b: u8) -> i32 {
        self.matrix[self.index[a as usize]][self.index[b as usize]]
    }

    pub fn bit_score(&self, raw: i32) -> f64 {
        (self.parameters.lambda * f64::from(raw) - self.parameters.k.ln()) / 2f64.ln()
    }
}

/// Result of one local alignment. Coordinates are 1-based and inclusive on
/// both sequences.
#[derive(Debug, Clone, Serialize)]
pub struct Alignment {
    pub raw_score: i32,
    pub bit_score: f64,
    /// Exact-match fraction of aligned columns, in percent
    pub identity: f64,
    /// Identity plus positive-scoring substitutions, in percent
    pub similarity: f64,
    pub mismatches: usize,
    pub gap_opens: usize,
    pub aligned_length: usize,
    pub query_start: usize,
    pub query_end: usize,
    pub target_start: usize,
    pub target_end: usize,
}

impl Alignment {
    /// Expected number of chance hits at this bit score.
    pub fn e_value(&self, query_length: u64, database_residues: u64) -> f64 {
        (query_length as f64 * database_residues as f64) / self.bit_score.exp2()
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Step {
    Stop,
    Diagonal,
    Up,
    Left,
}

/// Affine-gap Smith-Waterman over the full dynamic-programming table, with
/// traceback for the per-column statistics. Opening a gap of length one
/// costs `gap_open + gap_extend`; each further column costs `gap_extend`.
pub fn align(query: &str, target: &str, scheme: &ScoringScheme) -> Result<Alignment> {
    let q = query.as_bytes();
    let t = target.as_bytes();
    if q.is_empty() || t.is_empty() {
        return Err(ProtseekError::Input("cannot align an empty sequence".to_string()));
    }

    let (m, n) = (q.len(), t.len());
    let open = scheme.gap_open + scheme.gap_extend;
    let extend = scheme.gap_extend;

    let width = n + 1;
    let mut h = vec![0i32; (m + 1) * width];
    let mut e = vec![i32::MIN / 2; (m + 1) * width];
    let mut f = vec![i32::MIN / 2; (m + 1) * width];
    let mut step = vec![Step::Stop; (m + 1) * width];
    // Per-cell gap provenance: whether E/F chose to extend an existing gap
    // rather than open a new one, needed for a faithful traceback.
    let mut e_extends = vec![false; (m + 1) * width];
    let mut f_extends = vec![false; (m + 1) * width];

    let mut best = 0i32;
    let mut best_at = (0usize, 0usize);

    for i in 1..=m {
        for j in 1..=n {
            let idx = i * width + j;
            let e_open = h[idx - 1] - open;
            let e_extend = e[idx - 1] - extend;
            e[idx] = e_open.max(e_extend);
            e_extends[idx] = e_extend > e_open;

            let f_open = h[idx - width] - open;
            let f_extend = f[idx - width] - extend;
            f[idx] = f_open.max(f_extend);
            f_extends[idx] = f_extend > f_open;

            let diagonal = h[idx - width - 1] + scheme.score(q[i - 1], t[j - 1]);
            // Last maximum wins: diagonal beats gap moves on ties, and a
            // zero-score cell always terminates the traceback.
            let (score, direction) = [
                (f[idx], Step::Up),
                (e[idx], Step::Left),
                (diagonal, Step::Diagonal),
                (0, Step::Stop),
            ]
            .into_iter()
            .max_by_key(|&(s, _)| s)
            .unwrap_or((0, Step::Stop));

            h[idx] = score;
            step[idx] = direction;
            if score > best {
                best = score;
                best_at = (i, j);
            }
        }
    }

    // Traceback from the best cell. The walk mirrors the three-matrix
    // recurrence: a Left/Up step enters the E/F layer and stays there while
    // the cell's gap provenance says "extension", so a gap run is retraced
    // exactly as it was scored.
    enum Layer {
        Main,
        GapLeft,
        GapUp,
    }

    let (mut i, mut j) = best_at;
    let (query_end, target_end) = (i, j);
    let mut matches = 0usize;
    let mut positives = 0usize;
    let mut mismatches = 0usize;
    let mut gap_opens = 0usize;
    let mut columns = 0usize;
    let mut layer = Layer::Main;

    while i > 0 && j > 0 {
        let idx = i * width + j;
        match layer {
            Layer::Main => match step[idx] {
                Step::Stop => break,
                Step::Diagonal => {
                    columns += 1;
                    if q[i - 1] == t[j - 1] {
                        matches += 1;
                    } else {
                        mismatches += 1;
                        if scheme.score(q[i - 1], t[j - 1]) > 0 {
                            positives += 1;
                        }
                    }
                    i -= 1;
                    j -= 1;
                }
                Step::Left => layer = Layer::GapLeft,
                Step::Up => layer = Layer::GapUp,
            },
            Layer::GapLeft => {
                columns += 1;
                let opened = !e_extends[idx];
                j -= 1;
                if opened {
                    gap_opens += 1;
                    layer = Layer::Main;
                }
            }
            Layer::GapUp => {
                columns += 1;
                let opened = !f_extends[idx];
                i -= 1;
                if opened {
                    gap_opens += 1;
                    layer = Layer::Main;
                }
            }
        }
    }

    let identity = 100.0 * matches as f64 / columns.max(1) as f64;
    let similarity = 100.0 * (matches + positives) as f64 / columns.max(1) as f64;

    Ok(Alignment {
        raw_score: best,
        bit_score: scheme.bit_score(best),
        identity,
        similarity,
        mismatches,
        gap_opens,
        aligned_length: columns,
        query_start: i + 1,
        query_end,
        target_start: j + 1,
        target_end,
    })
}
