//! Extraction of embedded IP literals from queried hostnames.
//!
//! A hostname may carry an IPv4 address with its octets joined by dots
//! (`192.168.0.1.example.com`) or dashes (`192-168-0-1.example.com`), or an IPv6 address with
//! its groups joined by dashes and `--` standing in for the `::` compression
//! (`2001-4860-4860--8888.example.com`). The literal must sit on label boundaries: it is
//! only recognized at the start of the name or straight after a `.` or `-`, and must be
//! followed by the end of the name or another `.` or `-`.
//!
//! Extraction is two-phase: a byte scanner finds the leftmost region that is shaped like an
//! address, then the region is handed to [`Ipv4Addr`]/[`Ipv6Addr`] for numeric validation.
//! A region that looks right but doesn't validate (say, an octet with a leading zero) yields
//! nothing rather than falling through to a later region.

use std::net::{Ipv4Addr, Ipv6Addr};

/// Returns the leftmost IPv4 literal embedded in `name`, if any. A dash-joined literal
/// anywhere in the name wins over a dot-joined one.
pub fn embedded_ipv4(name: &str) -> Option<Ipv4Addr> {
    let bytes = name.as_bytes();
    let (start, end) = leftmost_quad(bytes, b'-').or_else(|| leftmost_quad(bytes, b'.'))?;
    name[start..end].replace('-', ".").parse().ok()
}

/// Returns the leftmost IPv6 literal embedded in `name`, if any.
pub fn embedded_ipv6(name: &str) -> Option<Ipv6Addr> {
    let bytes = name.as_bytes();
    for start in 0..bytes.len() {
        if start != 0 && !is_boundary(bytes[start - 1]) {
            continue;
        }
        let mut run_end = start;
        while run_end < bytes.len() && (bytes[run_end].is_ascii_hexdigit() || bytes[run_end] == b'-')
        {
            run_end += 1;
        }
        if run_end == start {
            continue;
        }
        if let Some(addr) = parse_run(name, start, run_end) {
            return Some(addr);
        }
    }
    None
}

fn is_boundary(byte: u8) -> bool {
    byte == b'.' || byte == b'-'
}

fn leftmost_quad(bytes: &[u8], sep: u8) -> Option<(usize, usize)> {
    for start in 0..bytes.len() {
        if start != 0 && !is_boundary(bytes[start - 1]) {
            continue;
        }
        if let Some(end) = match_quad(bytes, start, sep, 4) {
            return Some((start, end));
        }
    }
    None
}

/// Backtracking matcher for `remaining` octets joined by `sep`, starting at `pos`. The final
/// octet must be followed by the end of the name or a label boundary. Longer octets are
/// preferred, so `100-64-1-2` consumes `100` rather than stopping at `10`.
fn match_quad(bytes: &[u8], pos: usize, sep: u8, remaining: u8) -> Option<usize> {
    for len in [3usize, 2, 1] {
        let end = pos + len;
        if end > bytes.len() || !is_octet(&bytes[pos..end]) {
            continue;
        }
        if remaining == 1 {
            if end == bytes.len() || is_boundary(bytes[end]) {
                return Some(end);
            }
        } else if end < bytes.len() && bytes[end] == sep {
            if let Some(quad_end) = match_quad(bytes, end + 1, sep, remaining - 1) {
                return Some(quad_end);
            }
        }
    }
    None
}

/// Decimal octet syntax: one or two digits, or three digits no greater than 255. Two-digit
/// leading zeros pass here and are rejected by the numeric validation, the same split the
/// address parsers apply.
fn is_octet(digits: &[u8]) -> bool {
    if digits.is_empty() || digits.len() > 3 || !digits.iter().all(u8::is_ascii_digit) {
        return false;
    }
    match digits {
        [b'2', b'5', third] => *third <= b'5',
        [b'2', second, _] => *second <= b'4',
        [b'1', _, _] => true,
        [_, _, _] => false,
        _ => true,
    }
}

/// Tries the candidate endpoints of a hexadecimal-and-dash run, longest first: a dotted-quad
/// tail (`--ffff-192.168.0.1`), the full run, then each interior dash.
fn parse_run(name: &str, start: usize, run_end: usize) -> Option<Ipv6Addr> {
    let bytes = name.as_bytes();
    if let Some(tail_end) = v4_tail_end(bytes, start, run_end) {
        if let Some(addr) = parse_candidate(&name[start..tail_end]) {
            return Some(addr);
        }
    }
    if run_end == bytes.len() || bytes[run_end] == b'.' {
        if let Some(addr) = parse_candidate(&name[start..run_end]) {
            return Some(addr);
        }
    }
    for cut in (start + 1..run_end).rev() {
        if bytes[cut] == b'-' {
            if let Some(addr) = parse_candidate(&name[start..cut]) {
                return Some(addr);
            }
        }
    }
    None
}

/// When the run ends in decimal digits directly preceded by a dash (or the run start), those
/// digits may be the first octet of an embedded dotted quad. Returns the end of the quad.
fn v4_tail_end(bytes: &[u8], start: usize, run_end: usize) -> Option<usize> {
    if run_end >= bytes.len() || bytes[run_end] != b'.' {
        return None;
    }
    let mut oct_start = run_end;
    while oct_start > start && run_end - oct_start < 3 && bytes[oct_start - 1].is_ascii_digit() {
        oct_start -= 1;
    }
    if oct_start == run_end {
        return None;
    }
    if oct_start > start && bytes[oct_start - 1] != b'-' {
        return None;
    }
    match_quad(bytes, oct_start, b'.', 4)
}

fn parse_candidate(text: &str) -> Option<Ipv6Addr> {
    text.replace('-', ":").parse().ok()
}
