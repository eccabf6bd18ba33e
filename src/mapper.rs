//! Deterministic mapping from build identifiers and wall-clock time to
//! musical parameters.
//!
//! Every function here is pure. Hashing is a 32-bit FNV-1a over UTF-16 code
//! units so that the same project produces the same tune on any machine and
//! in any process.

use std::time::SystemTime;

const FNV_OFFSET_BASIS: u32 = 2_166_136_261;
const FNV_PRIME: u32 = 16_777_619;

/// Well-known build phases and the scale degree each one lands on.
const TARGET_DEGREES: &[(&str, i32)] = &[
    ("restore", 0),
    ("prepareforbuild", 0),
    ("beforebuild", 0),
    ("_checkforinvalidconfigurationandplatform", 0),
    ("resolvereferences", 2),
    ("resolveassemblyreferences", 2),
    ("resolvepackageassets", 2),
    ("generateassemblyinfo", 3),
    ("prebuildevent", 3),
    ("corecompile", 4),
    ("compile", 4),
    ("csc", 4),
    ("vbc", 4),
    ("copyfilestooutputdirectory", 5),
    ("incrementalclean", 5),
    ("postbuildevent", 6),
    ("afterbuild", 6),
    ("build", 7),
    ("pack", 7),
    ("package", 7),
    ("publish", 7),
    ("generatenuspec", 7),
    ("clean", -1),
    ("coreclean", -1),
];

pub fn stable_hash(text: &str) -> u32 {
    text.encode_utf16().fold(FNV_OFFSET_BASIS, |acc, unit| {
        (acc ^ unit as u32).wrapping_mul(FNV_PRIME)
    })
}

/// File name without directories or its last extension. Both `/` and `\`
/// count as separators since build logs may come from any platform.
fn file_stem(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    match name.rfind('.') {
        Some(dot) => &name[..dot],
        None => name,
    }
}

pub fn project_to_key(path: &str) -> u8 {
    (stable_hash(file_stem(path)) % 12) as u8
}

pub fn target_to_degree(name: &str) -> i32 {
    TARGET_DEGREES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|&(_, degree)| degree)
        .unwrap_or_else(|| (stable_hash(name) % 7) as i32)
}

pub fn task_to_offset(name: &str) -> u32 {
    stable_hash(name) % 5
}

/// Converts a wall-clock instant into a tick offset from `build_start`,
/// truncated onto the sixteenth-note grid. Instants before the build start
/// map to tick 0.
pub fn timestamp_to_tick(
    timestamp: SystemTime,
    build_start: SystemTime,
    bpm: f32,
    ticks_per_quarter: u32,
) -> u32 {
    let elapsed = timestamp
        .duration_since(build_start)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    let ticks = elapsed * (bpm as f64 / 60.0) * ticks_per_quarter as f64;
    // float to int casts saturate, so absurd elapsed times pin to the max
    let raw = ticks as u64;
    let grid = (ticks_per_quarter / 4).max(1) as u64;
    let quantized = raw - raw % grid;
    quantized.min(u32::MAX as u64) as u32
}
