//! Persisted Binary Form
//!
//! Length-prefixed little-endian encoding of matrices, S-systems, cases and
//! design spaces. Every message is wrapped in a strict envelope:
//!
//! ```text
//! magic: b"DSPACEv1" (8 bytes) + u16 version (=1) + u8 kind
//! payload (kind-specific records)
//! blake3 digest of everything above (32 bytes)
//! ```
//!
//! A matrix record carries `rows: u32, cols: u32` and `rows × cols` doubles
//! in row-major order. Optional fields carry a one-byte presence flag; a
//! case's `U`/`ζ` are absent exactly when its S-system is singular. Decoding
//! verifies magic, version, kind and digest before touching the payload.
//!
//! Derived quantities are never trusted from the wire: an S-system's
//! steady-state map is recomputed after decoding.

use std::sync::Arc;

use crate::case::DsCase;
use crate::designspace::{DesignSpace, Mode};
use crate::gma::Gma;
use crate::matrix::Matrix;
use crate::pool::{PoolError, VariablePool};
use crate::ssystem::SSystem;
use crate::{ConfigError, Endianness};

/// 8-byte file magic.
pub const MAGIC: &[u8; 8] = b"DSPACEv1";
/// Format version carried after the magic.
pub const VERSION: u16 = 1;

const KIND_MATRIX: u8 = 1;
const KIND_SSYSTEM: u8 = 2;
const KIND_CASE: u8 = 3;
const KIND_DESIGN_SPACE: u8 = 4;
const KIND_GMA: u8 = 5;

/// Errors surfaced by encoding or decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The buffer does not start with the expected magic.
    #[error("bad magic; not a design-space message")]
    BadMagic,
    /// The format version is not supported.
    #[error("unsupported format version {0}")]
    BadVersion(u16),
    /// The message kind does not match the decoder.
    #[error("expected message kind {expected}, found {found}")]
    BadKind {
        /// Kind the decoder was called for.
        expected: u8,
        /// Kind found in the envelope.
        found: u8,
    },
    /// The buffer ended before the structure was complete.
    #[error("message truncated")]
    Truncated,
    /// The integrity digest does not match the payload.
    #[error("integrity digest mismatch")]
    DigestMismatch,
    /// A string field is not valid UTF-8.
    #[error("string field is not valid UTF-8")]
    BadUtf8,
    /// A decoded structure is internally inconsistent.
    #[error("inconsistent message: {0}")]
    Inconsistent(String),
    /// Rebuilding a pool failed (duplicate names on the wire).
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The decoded endianness conflicts with the process configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ============================================================================
// Writer / reader primitives
// ============================================================================

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn new(kind: u8) -> Self {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&VERSION.to_le_bytes());
        buf.push(kind);
        Writer { buf }
    }

    fn finish(mut self) -> Vec<u8> {
        let digest = blake3::hash(&self.buf);
        self.buf.extend_from_slice(digest.as_bytes());
        self.buf
    }

    fn u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn string(&mut self, value: &str) {
        self.u32(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    fn matrix(&mut self, matrix: &Matrix) {
        self.u32(matrix.rows() as u32);
        self.u32(matrix.cols() as u32);
        for i in 0..matrix.rows() {
            for j in 0..matrix.cols() {
                self.f64(matrix.at(i, j));
            }
        }
    }

    fn optional_matrix(&mut self, matrix: Option<&Matrix>) {
        match matrix {
            Some(matrix) => {
                self.u8(1);
                self.matrix(matrix);
            }
            None => self.u8(0),
        }
    }

    fn pool(&mut self, pool: &VariablePool) {
        self.u32(pool.len() as u32);
        for (name, value) in pool.iter() {
            self.string(name);
            self.f64(value);
        }
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn open(buf: &'a [u8], kind: u8) -> Result<Self, CodecError> {
        if buf.len() < MAGIC.len() + 2 + 1 + 32 {
            return Err(CodecError::Truncated);
        }
        let (body, digest) = buf.split_at(buf.len() - 32);
        if blake3::hash(body).as_bytes() != digest {
            return Err(CodecError::DigestMismatch);
        }
        if body[..MAGIC.len()] != MAGIC[..] {
            return Err(CodecError::BadMagic);
        }
        let version = u16::from_le_bytes([body[8], body[9]]);
        if version != VERSION {
            return Err(CodecError::BadVersion(version));
        }
        let found = body[10];
        if found != kind {
            return Err(CodecError::BadKind { expected: kind, found });
        }
        Ok(Reader { buf: body, pos: 11 })
    }

    fn finish(self) -> Result<(), CodecError> {
        if self.pos != self.buf.len() {
            return Err(CodecError::Inconsistent("trailing bytes".to_string()));
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + len > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes(bytes.try_into().expect("4 bytes")))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        Ok(u64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        let bytes = self.take(8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("8 bytes")))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::BadUtf8)
    }

    fn matrix(&mut self) -> Result<Matrix, CodecError> {
        let rows = self.u32()? as usize;
        let cols = self.u32()? as usize;
        let mut out = Matrix::zeros(rows, cols);
        for i in 0..rows {
            for j in 0..cols {
                out.put(i, j, self.f64()?);
            }
        }
        Ok(out)
    }

    fn optional_matrix(&mut self) -> Result<Option<Matrix>, CodecError> {
        match self.u8()? {
            0 => Ok(None),
            1 => Ok(Some(self.matrix()?)),
            other => Err(CodecError::Inconsistent(format!("bad presence flag {other}"))),
        }
    }

    fn pool(&mut self) -> Result<Arc<VariablePool>, CodecError> {
        let count = self.u32()? as usize;
        let mut pool = VariablePool::new();
        for _ in 0..count {
            let name = self.string()?;
            let value = self.f64()?;
            pool.add_with_value(&name, value)?;
        }
        Ok(pool.into_shared())
    }
}

// ============================================================================
// Matrix
// ============================================================================

/// Encode one matrix.
pub fn encode_matrix(matrix: &Matrix) -> Vec<u8> {
    let mut w = Writer::new(KIND_MATRIX);
    w.matrix(matrix);
    w.finish()
}

/// Decode one matrix.
pub fn decode_matrix(buf: &[u8]) -> Result<Matrix, CodecError> {
    let mut r = Reader::open(buf, KIND_MATRIX)?;
    let matrix = r.matrix()?;
    r.finish()?;
    Ok(matrix)
}

// ============================================================================
// S-system
// ============================================================================

fn write_ssystem(w: &mut Writer, ssys: &SSystem) {
    w.pool(ssys.xd());
    w.pool(ssys.xd_a());
    w.pool(ssys.xd_t());
    w.pool(ssys.xi());
    w.matrix(ssys.alpha());
    w.matrix(ssys.beta());
    w.matrix(ssys.gd());
    w.matrix(ssys.gi());
    w.matrix(ssys.hd());
    w.matrix(ssys.hi());
}

fn read_ssystem(r: &mut Reader<'_>) -> Result<SSystem, CodecError> {
    let xd = r.pool()?;
    let xd_a = r.pool()?;
    let xd_t = r.pool()?;
    let xi = r.pool()?;
    let alpha = r.matrix()?;
    let beta = r.matrix()?;
    let gd = r.matrix()?;
    let gi = r.matrix()?;
    let hd = r.matrix()?;
    let hi = r.matrix()?;
    let n = xd.len();
    if alpha.rows() != n || gd.rows() != n || gd.cols() != n || gi.rows() != n {
        return Err(CodecError::Inconsistent(
            "S-system tensor shapes disagree with X_d".to_string(),
        ));
    }
    Ok(SSystem::from_parts(alpha, beta, gd, gi, hd, hi, xd, xd_a, xd_t, xi))
}

/// Encode one S-system (the steady-state map is derived, not persisted).
pub fn encode_ssystem(ssys: &SSystem) -> Vec<u8> {
    let mut w = Writer::new(KIND_SSYSTEM);
    write_ssystem(&mut w, ssys);
    w.finish()
}

/// Decode one S-system, recomputing its steady-state map.
pub fn decode_ssystem(buf: &[u8]) -> Result<SSystem, CodecError> {
    let mut r = Reader::open(buf, KIND_SSYSTEM)?;
    let ssys = read_ssystem(&mut r)?;
    r.finish()?;
    Ok(ssys)
}

// ============================================================================
// Case
// ============================================================================

fn write_case(w: &mut Writer, case: &DsCase) {
    write_ssystem(w, case.ssystem());
    w.u32(case.signature().len() as u32);
    for &digit in case.signature() {
        w.u64(digit as u64);
    }
    w.matrix(case.cd());
    w.matrix(case.ci());
    w.matrix(case.delta());
    w.optional_matrix(case.u());
    w.optional_matrix(case.zeta());
    w.u64(case.case_number() as u64);
    w.string(case.identifier());
}

fn read_case(r: &mut Reader<'_>) -> Result<DsCase, CodecError> {
    let ssystem = read_ssystem(r)?;
    let len = r.u32()? as usize;
    let mut signature = Vec::with_capacity(len);
    for _ in 0..len {
        signature.push(r.u64()? as usize);
    }
    if signature.len() != 2 * ssystem.num_equations() {
        return Err(CodecError::Inconsistent(
            "signature length disagrees with equation count".to_string(),
        ));
    }
    let cd = r.matrix()?;
    let ci = r.matrix()?;
    let delta = r.matrix()?;
    let u = r.optional_matrix()?;
    let zeta = r.optional_matrix()?;
    let case_number = r.u64()? as usize;
    let identifier = r.string()?;
    if u.is_some() == ssystem.is_singular() {
        return Err(CodecError::Inconsistent(
            "boundary presence disagrees with S-system singularity".to_string(),
        ));
    }
    Ok(DsCase::from_parts(
        ssystem,
        signature,
        cd,
        ci,
        delta,
        u,
        zeta,
        case_number,
        identifier,
    ))
}

/// Encode one case.
pub fn encode_case(case: &DsCase) -> Vec<u8> {
    let mut w = Writer::new(KIND_CASE);
    write_case(&mut w, case);
    w.finish()
}

/// Decode one case.
pub fn decode_case(buf: &[u8]) -> Result<DsCase, CodecError> {
    let mut r = Reader::open(buf, KIND_CASE)?;
    let case = read_case(&mut r)?;
    r.finish()?;
    Ok(case)
}

// ============================================================================
// GMA
// ============================================================================

fn write_gma(w: &mut Writer, gma: &Gma) {
    w.pool(gma.xd());
    w.pool(gma.xd_a());
    w.pool(gma.xd_t());
    w.pool(gma.xi());
    w.u32(gma.signature().len() as u32);
    for &entry in gma.signature() {
        w.u64(entry as u64);
    }
    w.matrix(gma.alpha());
    w.matrix(gma.beta());
    for k in 0..gma.num_equations() {
        w.matrix(&gma.gd()[k]);
        w.matrix(&gma.gi()[k]);
        w.matrix(&gma.hd()[k]);
        w.matrix(&gma.hi()[k]);
    }
}

fn read_gma(r: &mut Reader<'_>) -> Result<Gma, CodecError> {
    let xd = r.pool()?;
    let xd_a = r.pool()?;
    let xd_t = r.pool()?;
    let xi = r.pool()?;
    let len = r.u32()? as usize;
    let mut signature = Vec::with_capacity(len);
    for _ in 0..len {
        signature.push(r.u64()? as usize);
    }
    let n = xd.len();
    if len != 2 * n {
        return Err(CodecError::Inconsistent(
            "signature length disagrees with X_d".to_string(),
        ));
    }
    let alpha = r.matrix()?;
    let beta = r.matrix()?;
    let mut gd = Vec::with_capacity(n);
    let mut gi = Vec::with_capacity(n);
    let mut hd = Vec::with_capacity(n);
    let mut hi = Vec::with_capacity(n);
    for _ in 0..n {
        gd.push(r.matrix()?);
        gi.push(r.matrix()?);
        hd.push(r.matrix()?);
        hi.push(r.matrix()?);
    }
    if alpha.rows() != n || beta.rows() != n {
        return Err(CodecError::Inconsistent(
            "coefficient rows disagree with X_d".to_string(),
        ));
    }
    Ok(Gma::from_parts(alpha, beta, gd, gi, hd, hi, xd, xd_a, xd_t, xi, signature))
}

/// Encode one GMA system.
pub fn encode_gma(gma: &Gma) -> Vec<u8> {
    let mut w = Writer::new(KIND_GMA);
    write_gma(&mut w, gma);
    w.finish()
}

/// Decode one GMA system.
pub fn decode_gma(buf: &[u8]) -> Result<Gma, CodecError> {
    let mut r = Reader::open(buf, KIND_GMA)?;
    let gma = read_gma(&mut r)?;
    r.finish()?;
    Ok(gma)
}

// ============================================================================
// Design space
// ============================================================================

/// Encode one design space: its GMA, numbering convention, mode, prefix,
/// global condition rows, and the cycle-flux dictionary of any resolved
/// cyclical cases (memo state itself is not persisted).
pub fn encode_design_space(ds: &DesignSpace) -> Vec<u8> {
    let mut w = Writer::new(KIND_DESIGN_SPACE);
    write_gma(&mut w, ds.gma());
    w.u8(match ds.endianness() {
        Endianness::Big => 0,
        Endianness::Little => 1,
    });
    w.u8(match ds.mode() {
        Mode::Primary => 0,
        Mode::Derived => 1,
    });
    match ds.prefix() {
        Some(prefix) => {
            w.u8(1);
            w.string(prefix);
        }
        None => w.u8(0),
    }
    match ds.conditions() {
        Some((cd, ci, delta)) => {
            w.u8(1);
            w.matrix(cd);
            w.matrix(ci);
            w.matrix(delta);
        }
        None => w.u8(0),
    }
    // Cycle-flux dictionary: secondary → primary pairs across resolved
    // children, sorted for determinism.
    let mut fluxes: Vec<(String, String)> = ds
        .cyclical_case_numbers()
        .into_iter()
        .filter_map(|n| ds.cyclical_case(n))
        .flat_map(|c| {
            c.cycle_fluxes()
                .iter()
                .map(|(s, p)| (s.clone(), p.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    fluxes.sort();
    fluxes.dedup();
    w.u32(fluxes.len() as u32);
    for (secondary, primary) in fluxes {
        w.string(&secondary);
        w.string(&primary);
    }
    w.finish()
}

/// Decode one design space. Memoized validity and cyclical resolutions are
/// rebuilt on demand, not restored; the persisted cycle-flux dictionary is
/// informational and checked only for well-formedness.
pub fn decode_design_space(buf: &[u8]) -> Result<DesignSpace, CodecError> {
    let mut r = Reader::open(buf, KIND_DESIGN_SPACE)?;
    let gma = read_gma(&mut r)?;
    let endianness = match r.u8()? {
        0 => Endianness::Big,
        1 => Endianness::Little,
        other => return Err(CodecError::Inconsistent(format!("bad endianness tag {other}"))),
    };
    crate::set_endianness(endianness)?;
    let mode = match r.u8()? {
        0 => Mode::Primary,
        1 => Mode::Derived,
        other => return Err(CodecError::Inconsistent(format!("bad mode tag {other}"))),
    };
    let prefix = match r.u8()? {
        0 => None,
        1 => Some(r.string()?),
        other => return Err(CodecError::Inconsistent(format!("bad presence flag {other}"))),
    };
    let extra = match r.u8()? {
        0 => None,
        1 => {
            let cd = r.matrix()?;
            let ci = r.matrix()?;
            let delta = r.matrix()?;
            Some((cd, ci, delta))
        }
        other => return Err(CodecError::Inconsistent(format!("bad presence flag {other}"))),
    };
    let flux_count = r.u32()? as usize;
    for _ in 0..flux_count {
        let _secondary = r.string()?;
        let _primary = r.string()?;
    }
    r.finish()?;
    Ok(DesignSpace::from_parts(gma, endianness, mode, prefix, extra))
}

// -----------------------------------------------------------------------------
// Tests (round-trip: Decode(Encode(x)) ≡ x)
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssystem::SSystem;

    fn loop_gma() -> Gma {
        Gma::from_strings(&["x1. = a + b*x1*x2 - c*x1", "x2. = c*x1 - x2"]).unwrap()
    }

    #[test]
    fn matrix_round_trip() {
        let m = Matrix::from_rows(&[vec![1.5, -2.25, 0.0], vec![1e-13, 7.0, -0.5]]).unwrap();
        let decoded = decode_matrix(&encode_matrix(&m)).unwrap();
        assert_eq!(m, decoded);
    }

    #[test]
    fn ssystem_round_trip_recomputes_map() {
        let gma = loop_gma();
        let ssys = SSystem::from_gma(&gma, &[1, 1, 1, 1]).unwrap();
        let decoded = decode_ssystem(&encode_ssystem(&ssys)).unwrap();
        assert_eq!(ssys, decoded);
        assert!(!decoded.is_singular());
        // The recomputed map matches the original.
        let m0 = ssys.m().unwrap();
        let m1 = decoded.m().unwrap();
        for i in 0..2 {
            for j in 0..2 {
                assert!((m0.at(i, j) - m1.at(i, j)).abs() < 1e-15);
            }
        }
    }

    #[test]
    fn case_round_trip_including_boundaries() {
        let gma = loop_gma();
        let case =
            DsCase::from_gma(&gma, &[1, 1, 1, 1], Some("ds"), crate::Endianness::Big).unwrap();
        let decoded = decode_case(&encode_case(&case)).unwrap();
        assert_eq!(case, decoded);
        assert_eq!(decoded.identifier(), "ds_1");
        assert!(decoded.has_boundaries());
    }

    #[test]
    fn singular_case_round_trip_without_boundaries() {
        let gma = Gma::from_strings(&[
            "x1. = k21*x2 - k12*x1",
            "x2. = k12*x1 - k21*x2",
        ])
        .unwrap();
        let case = DsCase::from_gma(&gma, &[1, 1, 1, 1], None, crate::Endianness::Big).unwrap();
        assert!(case.is_singular());
        let decoded = decode_case(&encode_case(&case)).unwrap();
        assert_eq!(case, decoded);
        assert!(!decoded.has_boundaries());
    }

    #[test]
    fn gma_and_design_space_round_trip() {
        let gma = loop_gma();
        let decoded = decode_gma(&encode_gma(&gma)).unwrap();
        assert_eq!(gma, decoded);

        let mut ds = DesignSpace::new(loop_gma());
        ds.add_constraints(&["c > a"]).unwrap();
        let decoded = decode_design_space(&encode_design_space(&ds)).unwrap();
        assert_eq!(ds, decoded);
        assert!(decoded.conditions().is_some());
    }

    #[test]
    fn corrupted_payload_is_rejected() {
        let m = Matrix::identity(3);
        let mut bytes = encode_matrix(&m);
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;
        assert!(matches!(decode_matrix(&bytes), Err(CodecError::DigestMismatch)));

        let mut truncated = encode_matrix(&m);
        truncated.truncate(truncated.len() - 40);
        assert!(decode_matrix(&truncated).is_err());
    }

    #[test]
    fn kind_confusion_is_rejected() {
        let m = Matrix::identity(2);
        let bytes = encode_matrix(&m);
        assert!(matches!(
            decode_ssystem(&bytes),
            Err(CodecError::BadKind { .. })
        ));
    }
}
