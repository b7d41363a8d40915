//! CPU score: deterministic mapping from core count, nominal frequency, and
//! architecture family to a score in [1, 10] (§4.2, §8).

use std::fs;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuFacts {
    logical_cores: u32,
    nominal_mhz: u32,
    is_arm: bool,
}

/// Host CPU score in [1, 10]. Reads `/proc/cpuinfo` directly; no crate is
/// warranted for a handful of line scans.
pub fn cpu_score() -> u8 {
    score_from_facts(read_cpu_facts())
}

fn read_cpu_facts() -> CpuFacts {
    let contents = fs::read_to_string("/proc/cpuinfo").unwrap_or_default();

    let mut logical_cores = 0u32;
    let mut max_mhz = 0u32;
    let mut is_arm = false;

    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            match key {
                "processor" => logical_cores += 1,
                "cpu MHz" => {
                    if let Ok(mhz) = value.parse::<f64>() {
                        max_mhz = max_mhz.max(mhz as u32);
                    }
                }
                "model name" => {
                    is_arm = is_arm || value.to_ascii_lowercase().contains("arm");
                }
                _ => {}
            }
        }
    }

    if logical_cores == 0 {
        logical_cores = 1;
    }
    is_arm = is_arm || cfg!(target_arch = "arm") || cfg!(target_arch = "aarch64");

    CpuFacts {
        logical_cores,
        nominal_mhz: max_mhz,
        is_arm,
    }
}

fn score_from_facts(facts: CpuFacts) -> u8 {
    // Base score from core count: diminishing returns past 4 cores.
    let core_score = match facts.logical_cores {
        1 => 1,
        2 => 3,
        3 | 4 => 5,
        5..=7 => 7,
        _ => 9,
    };

    // Frequency adjustment: a slow chip with many cores (e.g. a Pi's
    // big.LITTLE cluster) is penalized one point; a fast chip gets one more.
    let freq_adjustment: i32 = match facts.nominal_mhz {
        0 => 0,
        mhz if mhz < 1_200 => -1,
        mhz if mhz >= 2_400 => 1,
        _ => 0,
    };

    // ARM SBCs (Raspberry Pi class) skew the table down one notch relative
    // to an x86 desktop with the same core count, reflecting their weaker
    // per-core software-encode throughput.
    let arch_adjustment: i32 = if facts.is_arm { -1 } else { 0 };

    let score = core_score as i32 + freq_adjustment + arch_adjustment;
    score.clamp(1, 10) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_core_scores_minimum() {
        let facts = CpuFacts {
            logical_cores: 1,
            nominal_mhz: 1000,
            is_arm: false,
        };
        assert_eq!(score_from_facts(facts), 1);
    }

    #[test]
    fn fast_many_core_desktop_scores_maximum() {
        let facts = CpuFacts {
            logical_cores: 16,
            nominal_mhz: 3_600,
            is_arm: false,
        };
        assert_eq!(score_from_facts(facts), 10);
    }

    #[test]
    fn arm_sbc_penalized_relative_to_x86_equivalent() {
        let arm = CpuFacts {
            logical_cores: 4,
            nominal_mhz: 1_500,
            is_arm: true,
        };
        let x86 = CpuFacts {
            logical_cores: 4,
            nominal_mhz: 1_500,
            is_arm: false,
        };
        assert!(score_from_facts(arm) < score_from_facts(x86));
    }

    #[test]
    fn score_is_always_in_range() {
        for cores in [0u32, 1, 2, 4, 8, 16, 64] {
            for mhz in [0u32, 600, 1_200, 2_400, 5_000] {
                for is_arm in [true, false] {
                    let facts = CpuFacts {
                        logical_cores: cores,
                        nominal_mhz: mhz,
                        is_arm,
                    };
                    let score = score_from_facts(facts);
                    assert!((1..=10).contains(&score));
                }
            }
        }
    }
}
