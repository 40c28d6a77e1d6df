//! C.4 — a plain-text symbol dump/load format, for caching an analyzed
//! `Symbol` across runs without re-running C2/C3 (spec §6).
//!
//! The format is deliberately simple: a header line with `n`, `cblknbr`,
//! `bloknbr`, then one line per `Cblk` (including the sentinel), then one
//! line per `Blok` (including the sentinel), then one line per `browtab`
//! entry. Re-running `check_structural_invariants`/
//! `analysis::check_analyzed_invariants` on load catches any corruption.

use std::fmt::Write as _;

use crate::error::PastixError;
use crate::symbol::analysis::check_analyzed_invariants;
use crate::symbol::{Blok, Cblk, Symbol};

const MAGIC: &str = "pastix-symbol-v1";

/// Serializes `symbol` to the text format described above.
pub fn dump(symbol: &Symbol) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{MAGIC} n={} cblknbr={} bloknbr={} analyzed={}",
        symbol.n(),
        symbol.cblknbr(),
        symbol.bloknbr(),
        symbol.analyzed
    );
    for cblk in &symbol.cblktab {
        let _ = writeln!(
            out,
            "C {} {} {} {}",
            cblk.fcolnum, cblk.lcolnum, cblk.bloknum, cblk.brownum
        );
    }
    for blok in &symbol.bloktab {
        let _ = writeln!(
            out,
            "B {} {} {} {}",
            blok.frownum, blok.lrownum, blok.lcblknm, blok.fcblknm
        );
    }
    for &b in &symbol.browtab {
        let _ = writeln!(out, "R {b}");
    }
    out
}

/// Parses a `Symbol` previously produced by [`dump`], re-validating every
/// invariant before returning it (spec §6: a reloaded symbol must be
/// indistinguishable from a freshly analyzed one).
pub fn load(text: &str) -> Result<Symbol, PastixError> {
    let bad = || PastixError::Matrix {
        message: "malformed symbol text format".to_string(),
    };

    let mut lines = text.lines();
    let header = lines.next().ok_or_else(bad)?;
    if !header.starts_with(MAGIC) {
        return Err(bad());
    }
    let mut n = None;
    let mut cblknbr = None;
    let mut bloknbr = None;
    let mut analyzed = None;
    for field in header.split_whitespace().skip(1) {
        let (key, value) = field.split_once('=').ok_or_else(bad)?;
        match key {
            "n" => n = Some(value.parse::<usize>().map_err(|_| bad())?),
            "cblknbr" => cblknbr = Some(value.parse::<usize>().map_err(|_| bad())?),
            "bloknbr" => bloknbr = Some(value.parse::<usize>().map_err(|_| bad())?),
            "analyzed" => analyzed = Some(value.parse::<bool>().map_err(|_| bad())?),
            _ => return Err(bad()),
        }
    }
    let n = n.ok_or_else(bad)?;
    let cblknbr = cblknbr.ok_or_else(bad)?;
    let bloknbr = bloknbr.ok_or_else(bad)?;
    let analyzed = analyzed.ok_or_else(bad)?;

    let mut cblktab = Vec::with_capacity(cblknbr + 1);
    for _ in 0..=cblknbr {
        let line = lines.next().ok_or_else(bad)?;
        let mut parts = line.split_whitespace();
        if parts.next() != Some("C") {
            return Err(bad());
        }
        let fcolnum = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let lcolnum = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let bloknum = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let brownum = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        cblktab.push(Cblk {
            fcolnum,
            lcolnum,
            bloknum,
            brownum,
        });
    }

    let mut bloktab = Vec::with_capacity(bloknbr + 1);
    for _ in 0..=bloknbr {
        let line = lines.next().ok_or_else(bad)?;
        let mut parts = line.split_whitespace();
        if parts.next() != Some("B") {
            return Err(bad());
        }
        let frownum = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let lrownum = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let lcblknm = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let fcblknm = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        bloktab.push(Blok {
            frownum,
            lrownum,
            lcblknm,
            fcblknm,
        });
    }

    let mut browtab = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut parts = line.split_whitespace();
        if parts.next() != Some("R") {
            return Err(bad());
        }
        browtab.push(parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?);
    }

    let symbol = Symbol {
        cblktab,
        bloktab,
        browtab,
        n,
        analyzed,
    };
    symbol.check_structural_invariants()?;
    if symbol.analyzed {
        check_analyzed_invariants(&symbol)?;
    }
    Ok(symbol)
}
