//! Hypervisor command builders for ATM switch operations

use std::fmt::Display;

use dynamips_common::quote;

use crate::types::{Vci, Vpi};

/// Hypervisor module for ATM switches
pub const ATMSW_MODULE: &str = "atmsw";

/// Hypervisor module accepting the rename command
pub const ATM_RENAME_MODULE: &str = "atm";

/// Build create switch command
pub fn build_create_switch_cmd(name: &str) -> String {
    format!("{} create {}", ATMSW_MODULE, quote(name))
}

/// Build rename switch command
pub fn build_rename_switch_cmd(name: &str, new_name: &str) -> String {
    format!(
        "{} rename {} {}",
        ATM_RENAME_MODULE,
        quote(name),
        quote(new_name)
    )
}

/// Build delete switch command
pub fn build_delete_switch_cmd(name: &str) -> String {
    format!("{} delete {}", ATMSW_MODULE, quote(name))
}

/// Build create Virtual Path connection command
pub fn build_create_vpc_cmd(
    name: &str,
    input_nio: &dyn Display,
    input_vpi: Vpi,
    output_nio: &dyn Display,
    output_vpi: Vpi,
) -> String {
    format!(
        "{} create_vpc {} {} {} {} {}",
        ATMSW_MODULE,
        quote(name),
        input_nio,
        input_vpi,
        output_nio,
        output_vpi
    )
}

/// Build delete Virtual Path connection command
pub fn build_delete_vpc_cmd(
    name: &str,
    input_nio: &dyn Display,
    input_vpi: Vpi,
    output_nio: &dyn Display,
    output_vpi: Vpi,
) -> String {
    format!(
        "{} delete_vpc {} {} {} {} {}",
        ATMSW_MODULE,
        quote(name),
        input_nio,
        input_vpi,
        output_nio,
        output_vpi
    )
}

/// Build create Virtual Channel connection command
#[allow(clippy::too_many_arguments)]
pub fn build_create_vcc_cmd(
    name: &str,
    input_nio: &dyn Display,
    input_vpi: Vpi,
    input_vci: Vci,
    output_nio: &dyn Display,
    output_vpi: Vpi,
    output_vci: Vci,
) -> String {
    format!(
        "{} create_vcc {} {} {} {} {} {} {}",
        ATMSW_MODULE,
        quote(name),
        input_nio,
        input_vpi,
        input_vci,
        output_nio,
        output_vpi,
        output_vci
    )
}

/// Build delete Virtual Channel connection command
#[allow(clippy::too_many_arguments)]
pub fn build_delete_vcc_cmd(
    name: &str,
    input_nio: &dyn Display,
    input_vpi: Vpi,
    input_vci: Vci,
    output_nio: &dyn Display,
    output_vpi: Vpi,
    output_vci: Vci,
) -> String {
    format!(
        "{} delete_vcc {} {} {} {} {} {} {}",
        ATMSW_MODULE,
        quote(name),
        input_nio,
        input_vpi,
        input_vci,
        output_nio,
        output_vpi,
        output_vci
    )
}

/// Build the capture filter setup arguments
pub fn build_capture_filter_args(data_link_type: &str, output_file: &str) -> String {
    format!("{} {}", data_link_type, output_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_create_switch_cmd() {
        assert_eq!(build_create_switch_cmd("SW1"), "atmsw create \"SW1\"");
    }

    #[test]
    fn test_build_rename_switch_cmd() {
        assert_eq!(
            build_rename_switch_cmd("SW1", "Core ATM"),
            "atm rename \"SW1\" \"Core ATM\""
        );
    }

    #[test]
    fn test_build_delete_switch_cmd() {
        assert_eq!(build_delete_switch_cmd("SW1"), "atmsw delete \"SW1\"");
    }

    #[test]
    fn test_build_vpc_cmds() {
        assert_eq!(
            build_create_vpc_cmd("SW1", &"nio_udp_0", 10, &"nio_udp_1", 20),
            "atmsw create_vpc \"SW1\" nio_udp_0 10 nio_udp_1 20"
        );
        assert_eq!(
            build_delete_vpc_cmd("SW1", &"nio_udp_0", 10, &"nio_udp_1", 20),
            "atmsw delete_vpc \"SW1\" nio_udp_0 10 nio_udp_1 20"
        );
    }

    #[test]
    fn test_build_vcc_cmds() {
        assert_eq!(
            build_create_vcc_cmd("SW1", &"nio_a", 1, 100, &"nio_b", 2, 200),
            "atmsw create_vcc \"SW1\" nio_a 1 100 nio_b 2 200"
        );
        assert_eq!(
            build_delete_vcc_cmd("SW1", &"nio_a", 1, 100, &"nio_b", 2, 200),
            "atmsw delete_vcc \"SW1\" nio_a 1 100 nio_b 2 200"
        );
    }

    #[test]
    fn test_quoting_safety() {
        // A quote in the name must not terminate the name argument
        let cmd = build_create_switch_cmd("SW\" 1");
        assert_eq!(cmd, "atmsw create \"SW\\\" 1\"");
    }

    #[test]
    fn test_build_capture_filter_args() {
        assert_eq!(
            build_capture_filter_args("atm_rfc1483", "/tmp/out.pcap"),
            "atm_rfc1483 /tmp/out.pcap"
        );
    }
}
