use crate::domain::constants::DUT_DOMAIN;

const SUSPICIOUS_PREFIX: &str = "crossk-";
const SUSPICIOUS_SUFFIX: &str = ".cros";

/// Corrects common hostname typos before any lookup.
///
/// Strips every leading `crossk-` and every trailing `.cros`, so applying it
/// twice gives the same result as applying it once.
pub fn fix_suspicious_hostname(hostname: &str) -> String {
    let mut host = hostname;
    loop {
        let before = host.len();
        while let Some(rest) = host.strip_prefix(SUSPICIOUS_PREFIX) {
            host = rest;
        }
        while let Some(rest) = host.strip_suffix(SUSPICIOUS_SUFFIX) {
            host = rest;
        }
        if host.len() == before {
            return host.to_string();
        }
    }
}

/// Converts a bare DUT name into its fully-qualified domain name.
///
/// Assumes `dut_name` is a valid DUT name; the output is arbitrary otherwise.
pub fn dut_name_to_fqdn(dut_name: &str) -> String {
    format!("{dut_name}.{DUT_DOMAIN}")
}
