//! Source-specific parsers. None of them fail: unexpected input degrades to
//! defaults so that one odd line never costs the whole snapshot.

pub mod device;
pub mod framework;
pub mod hal;
pub mod net;
pub mod proc;
pub mod security;

fn parse_u64_loose(input: &str) -> Option<u64> {
    let trimmed = input.trim();
    if let Ok(v) = trimmed.parse::<u64>() {
        return Some(v);
    }
    let digits: String = trimmed
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse::<u64>().ok()
}
