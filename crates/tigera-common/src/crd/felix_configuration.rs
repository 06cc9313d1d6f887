//! FelixConfiguration: configuration schema of the per-node dataplane agent
//!
//! A passive data type. The operator only ever reads or patches it, so every
//! field is optional and omitted when unset. `bpfLogLevel` is the one
//! exception and is always serialized.

use std::time::Duration as StdDuration;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

const LOG_LEVELS: &[&str] = &["debug", "info", "warning", "error", "fatal"];
const BPF_LOG_LEVELS: &[&str] = &["off", "info", "debug"];
const ROUTE_SOURCES: &[&str] = &["workloadips", "calicoipam"];
const BPF_SERVICE_MODES: &[&str] = &["tunnel", "dsr"];
const CHAIN_INSERT_MODES: &[&str] = &["insert", "append"];

/// Whether the nftables dataplane is used
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum NFTablesMode {
    /// Program nftables
    Enabled,
    /// Program iptables
    Disabled,
}

/// iptables binary flavour
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum IptablesBackend {
    /// iptables-legacy
    Legacy,
    /// iptables-nft
    #[serde(rename = "NFT")]
    NFTables,
}

/// How the agent handles the AWS source/destination check
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum AWSSrcDstCheckOption {
    /// Leave the instance setting alone
    DoNothing,
    /// Turn the check on
    Enable,
    /// Turn the check off
    Disable,
}

/// Whether traffic is transparently proxied
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum TPROXYModeOption {
    /// Proxy traffic selected by policy
    Enabled,
    /// Never proxy
    Disabled,
}

/// Inclusive range of routing table indices the agent may use
#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct RouteTableRange {
    /// First table index
    pub min: i32,
    /// Last table index
    pub max: i32,
}

/// Protocol, port and optional CIDR, used for failsafe rules
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ProtoPort {
    /// "tcp", "udp" or "sctp"
    pub protocol: String,
    /// Port number
    pub port: u16,
    /// CIDR the rule is restricted to; empty means any
    #[serde(default)]
    pub net: String,
}

/// Duration in Go notation, e.g. "90s" or "1m30s"
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct Duration(pub String);

impl Duration {
    /// Parse into a std duration
    ///
    /// Accepts a sequence of decimal numbers with unit suffixes ("ns", "us",
    /// "µs", "ms", "s", "m", "h"), and the bare value "0". Negative values are
    /// rejected.
    pub fn parse(&self) -> Result<StdDuration, Error> {
        parse_go_duration(&self.0)
    }
}

impl From<&str> for Duration {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

fn parse_go_duration(input: &str) -> Result<StdDuration, Error> {
    let invalid = || Error::validation_for("FelixConfiguration", format!("invalid duration {input:?}"));

    let s = input.strip_prefix('+').unwrap_or(input);
    if s.starts_with('-') {
        return Err(Error::validation_for(
            "FelixConfiguration",
            format!("negative duration {input:?}"),
        ));
    }
    if s == "0" {
        return Ok(StdDuration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        if num_len == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_len].parse().map_err(|_| invalid())?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total += value * nanos_per_unit;
    }

    Ok(StdDuration::from_nanos(total.round() as u64))
}

/// Per-node or cluster-wide dataplane agent configuration
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "crd.projectcalico.org",
    version = "v1",
    kind = "FelixConfiguration"
)]
#[serde(rename_all = "camelCase")]
pub struct FelixConfigurationSpec {
    /// Use the built-in dataplane driver
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_internal_dataplane_driver: Option<bool>,
    /// Path of an external dataplane driver
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dataplane_driver: String,
    /// Program IPv6 rules and routes
    #[serde(default, rename = "ipv6Support", skip_serializing_if = "Option::is_none")]
    pub ipv6_support: Option<bool>,

    /// Period between route resyncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_refresh_interval: Option<Duration>,
    /// Period between interface resyncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface_refresh_interval: Option<Duration>,
    /// Period between iptables resyncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_refresh_interval: Option<Duration>,
    /// Delay before re-reading iptables after a write
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_post_write_check_interval: Option<Duration>,
    /// Location of the iptables lock file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iptables_lock_file_path: String,
    /// How long to wait for the iptables lock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_lock_timeout: Option<Duration>,
    /// How often to probe the iptables lock
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_lock_probe_interval: Option<Duration>,
    /// Overrides for kernel feature detection ("key=value,...")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub feature_detect_override: String,
    /// Period between ipset resyncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipsets_refresh_interval: Option<Duration>,
    /// Maximum number of entries per ipset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ipset_size: Option<i32>,
    /// iptables binary flavour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_backend: Option<IptablesBackend>,
    /// Period between XDP resyncs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xdp_refresh_interval: Option<Duration>,
    /// Timeout for netlink calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netlink_timeout: Option<Duration>,

    /// OpenStack metadata server address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metadata_addr: String,
    /// OpenStack metadata server port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_port: Option<i32>,
    /// OpenStack region
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub openstack_region: String,

    /// Prefix of workload interface names
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface_prefix: String,
    /// Interfaces the agent ignores
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub interface_exclude: String,
    /// "insert" or "append" for top-level chains
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub chain_insert_mode: String,
    /// Drop, Accept or Return for endpoint-to-host traffic
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_endpoint_to_host_action: String,
    /// Accept or Return in the filter table
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iptables_filter_allow_action: String,
    /// Accept or Return in the mangle table
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub iptables_mangle_allow_action: String,

    /// Prefix of log lines for dropped packets
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_prefix: String,
    /// Log file location
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_file_path: String,
    /// Minimum severity written to the log file
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_severity_file: String,
    /// Minimum severity written to stdout
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_severity_screen: String,
    /// Minimum severity written to syslog
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log_severity_sys: String,

    /// Program IP-in-IP routes
    #[serde(default, rename = "ipipEnabled", skip_serializing_if = "Option::is_none")]
    pub ipip_enabled: Option<bool>,
    /// MTU of the IP-in-IP device
    #[serde(default, rename = "ipipMTU", skip_serializing_if = "Option::is_none")]
    pub ipip_mtu: Option<i32>,
    /// Program VXLAN routes
    #[serde(default, rename = "vxlanEnabled", skip_serializing_if = "Option::is_none")]
    pub vxlan_enabled: Option<bool>,
    /// MTU of the VXLAN device
    #[serde(default, rename = "vxlanMTU", skip_serializing_if = "Option::is_none")]
    pub vxlan_mtu: Option<i32>,
    /// VXLAN UDP port
    #[serde(default, rename = "vxlanPort", skip_serializing_if = "Option::is_none")]
    pub vxlan_port: Option<i32>,
    /// VXLAN network identifier
    #[serde(default, rename = "vxlanVNI", skip_serializing_if = "Option::is_none")]
    pub vxlan_vni: Option<i32>,

    /// Period between status reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporting_interval: Option<Duration>,
    /// TTL of status reports
    #[serde(default, rename = "reportingTTL", skip_serializing_if = "Option::is_none")]
    pub reporting_ttl: Option<Duration>,
    /// Report per-endpoint status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_reporting_enabled: Option<bool>,
    /// Delay before reporting endpoint status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_reporting_delay: Option<Duration>,
    /// Directory for endpoint status files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_status_path_prefix: Option<String>,

    /// Mark bits reserved for the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iptables_mark_mask: Option<u32>,
    /// Skip dropping conntrack-invalid packets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_conntrack_invalid_check: Option<bool>,

    /// Serve the health endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_enabled: Option<bool>,
    /// Health endpoint bind address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_host: Option<String>,
    /// Health endpoint port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_port: Option<i32>,

    /// Serve Prometheus metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_metrics_enabled: Option<bool>,
    /// Prometheus bind address
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prometheus_metrics_host: String,
    /// Prometheus port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_metrics_port: Option<i32>,
    /// Include Go runtime metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_go_metrics_enabled: Option<bool>,
    /// Include process metrics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_process_metrics_enabled: Option<bool>,
    /// Port of the flow/denied-packet reporter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus_reporter_port: Option<i32>,

    /// Inbound host ports that are always allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failsafe_inbound_host_ports: Option<Vec<ProtoPort>>,
    /// Outbound host ports that are always allowed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failsafe_outbound_host_ports: Option<Vec<ProtoPort>>,
    /// NodePort ranges used by kube-proxy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_node_port_ranges: Option<Vec<IntOrString>>,

    /// Directory of the policy sync API sockets
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy_sync_path_prefix: String,

    /// Send anonymous usage reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_reporting_enabled: Option<bool>,
    /// Delay before the first usage report
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_reporting_initial_delay: Option<Duration>,
    /// Period between usage reports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_reporting_interval: Option<Duration>,

    /// Source port range for NAT-outgoing
    #[serde(default, rename = "natPortRange", skip_serializing_if = "Option::is_none")]
    pub nat_port_range: Option<IntOrString>,
    /// Source address for NAT-outgoing
    #[serde(default, rename = "natOutgoingAddress", skip_serializing_if = "String::is_empty")]
    pub nat_outgoing_address: String,
    /// Source address for device routes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_route_source_address: String,
    /// Protocol number for device routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_route_protocol: Option<i32>,
    /// Remove routes not programmed by the agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remove_external_routes: Option<bool>,
    /// CIDRs of external nodes allowed to reach workloads
    #[serde(default, rename = "externalNodesList", skip_serializing_if = "Option::is_none")]
    pub external_nodes_cidr_list: Option<Vec<String>>,

    /// Write a memory profile on signal
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub debug_memory_profile_path: String,
    /// Never drop log lines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_disable_log_dropping: Option<bool>,
    /// Test hook: hang the calculation graph
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_simulate_calc_graph_hang_after: Option<Duration>,
    /// Test hook: hang the dataplane
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_simulate_dataplane_hang_after: Option<Duration>,

    /// Interfaces excluded from NAT-outgoing
    #[serde(
        default,
        rename = "iptablesNATOutgoingInterfaceFilter",
        skip_serializing_if = "String::is_empty"
    )]
    pub iptables_nat_outgoing_interface_filter: String,
    /// Accelerate sidecar traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecar_acceleration_enabled: Option<bool>,
    /// Use XDP for untracked deny rules
    #[serde(default, rename = "xdpEnabled", skip_serializing_if = "Option::is_none")]
    pub xdp_enabled: Option<bool>,
    /// Allow generic (non-offloaded) XDP
    #[serde(default, rename = "genericXDPEnabled", skip_serializing_if = "Option::is_none")]
    pub generic_xdp_enabled: Option<bool>,
    /// nftables dataplane mode
    #[serde(default, rename = "nftablesMode", skip_serializing_if = "Option::is_none")]
    pub nftables_mode: Option<NFTablesMode>,

    /// Use the eBPF dataplane
    #[serde(default, rename = "bpfEnabled", skip_serializing_if = "Option::is_none")]
    pub bpf_enabled: Option<bool>,
    /// Disable unprivileged BPF
    #[serde(default, rename = "bpfDisableUnprivileged", skip_serializing_if = "Option::is_none")]
    pub bpf_disable_unprivileged: Option<bool>,
    /// eBPF program log level ("Off", "Info", "Debug")
    #[serde(default, rename = "bpfLogLevel")]
    pub bpf_log_level: String,
    /// Regex of data interfaces for eBPF
    #[serde(default, rename = "bpfDataIfacePattern", skip_serializing_if = "String::is_empty")]
    pub bpf_data_iface_pattern: String,
    /// Connect-time load balancing
    #[serde(
        default,
        rename = "bpfConnectTimeLoadBalancingEnabled",
        skip_serializing_if = "Option::is_none"
    )]
    pub bpf_connect_time_load_balancing_enabled: Option<bool>,
    /// "Tunnel" or "DSR" for external service traffic
    #[serde(default, rename = "bpfExternalServiceMode", skip_serializing_if = "String::is_empty")]
    pub bpf_external_service_mode: String,
    /// Remove kube-proxy iptables rules
    #[serde(
        default,
        rename = "bpfKubeProxyIptablesCleanupEnabled",
        skip_serializing_if = "Option::is_none"
    )]
    pub bpf_kube_proxy_iptables_cleanup_enabled: Option<bool>,
    /// Minimum interval between service map syncs
    #[serde(default, rename = "bpfKubeProxyMinSyncPeriod", skip_serializing_if = "Option::is_none")]
    pub bpf_kube_proxy_min_sync_period: Option<Duration>,
    /// Use EndpointSlices
    #[serde(
        default,
        rename = "bpfKubeProxyEndpointSlicesEnabled",
        skip_serializing_if = "Option::is_none"
    )]
    pub bpf_kube_proxy_endpoint_slices_enabled: Option<bool>,
    /// Bypass conntrack for host traffic
    #[serde(default, rename = "bpfHostConntrackBypass", skip_serializing_if = "Option::is_none")]
    pub bpf_host_conntrack_bypass: Option<bool>,

    /// "WorkloadIPs" or "CalicoIPAM"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route_source: String,
    /// Routing tables the agent may use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_table_range: Option<RouteTableRange>,

    /// Encrypt IPv4 traffic with WireGuard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard_enabled: Option<bool>,
    /// Encrypt IPv6 traffic with WireGuard
    #[serde(default, rename = "wireguardEnabledV6", skip_serializing_if = "Option::is_none")]
    pub wireguard_enabled_v6: Option<bool>,
    /// IPv4 WireGuard port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard_listening_port: Option<i32>,
    /// IPv6 WireGuard port
    #[serde(default, rename = "wireguardListeningPortV6", skip_serializing_if = "Option::is_none")]
    pub wireguard_listening_port_v6: Option<i32>,
    /// Priority of the WireGuard routing rule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard_routing_rule_priority: Option<i32>,
    /// IPv4 WireGuard interface name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wireguard_interface_name: String,
    /// IPv6 WireGuard interface name
    #[serde(default, rename = "wireguardInterfaceNameV6", skip_serializing_if = "String::is_empty")]
    pub wireguard_interface_name_v6: String,
    /// IPv4 WireGuard MTU
    #[serde(default, rename = "wireguardMTU", skip_serializing_if = "Option::is_none")]
    pub wireguard_mtu: Option<i32>,
    /// IPv6 WireGuard MTU
    #[serde(default, rename = "wireguardMTUV6", skip_serializing_if = "Option::is_none")]
    pub wireguard_mtu_v6: Option<i32>,
    /// Encrypt host-to-host traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireguard_host_encryption_enabled: Option<bool>,
    /// WireGuard persistent keepalive
    #[serde(default, rename = "wireguardKeepAlive", skip_serializing_if = "Option::is_none")]
    pub wireguard_persistent_keep_alive: Option<Duration>,

    /// AWS source/destination check handling
    #[serde(default, rename = "awsSrcDstCheck", skip_serializing_if = "Option::is_none")]
    pub aws_src_dst_check: Option<AWSSrcDstCheckOption>,
    /// Transparent proxy mode
    #[serde(default, rename = "tproxyMode", skip_serializing_if = "Option::is_none")]
    pub tproxy_mode: Option<TPROXYModeOption>,
    /// Egress gateway VXLAN port
    #[serde(default, rename = "egressIPVXLANPort", skip_serializing_if = "Option::is_none")]
    pub egress_ip_vxlan_port: Option<i32>,
    /// Egress gateway VXLAN network identifier
    #[serde(default, rename = "egressIPVXLANVNI", skip_serializing_if = "Option::is_none")]
    pub egress_ip_vxlan_vni: Option<i32>,
    /// DNS servers trusted for domain-based policy
    #[serde(default, rename = "dnsTrustedServers", skip_serializing_if = "Option::is_none")]
    pub dns_trusted_servers: Option<Vec<String>>,
    /// Write WAF events to a log file
    #[serde(default, rename = "wafEventLogsFileEnabled", skip_serializing_if = "Option::is_none")]
    pub waf_event_logs_file_enabled: Option<bool>,
}

fn check_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), Error> {
    if value.is_empty() || allowed.contains(&value.to_lowercase().as_str()) {
        return Ok(());
    }
    Err(Error::validation_for(
        "FelixConfiguration",
        format!("{field}: {value:?} is not one of {allowed:?}"),
    ))
}

fn check_range(field: &str, value: Option<i32>, min: i32, max: i32) -> Result<(), Error> {
    match value {
        Some(v) if !(min..=max).contains(&v) => Err(Error::validation_for(
            "FelixConfiguration",
            format!("{field}: {v} is outside {min}..={max}"),
        )),
        _ => Ok(()),
    }
}

impl FelixConfigurationSpec {
    /// Check the value constraints the API server enforces
    pub fn validate(&self) -> Result<(), Error> {
        for (field, value) in [
            ("logSeverityFile", &self.log_severity_file),
            ("logSeverityScreen", &self.log_severity_screen),
            ("logSeveritySys", &self.log_severity_sys),
        ] {
            check_one_of(field, value, LOG_LEVELS)?;
        }
        check_one_of(
            "defaultEndpointToHostAction",
            &self.default_endpoint_to_host_action,
            &["drop", "accept", "return"],
        )?;
        check_one_of(
            "iptablesFilterAllowAction",
            &self.iptables_filter_allow_action,
            &["accept", "return"],
        )?;
        check_one_of(
            "iptablesMangleAllowAction",
            &self.iptables_mangle_allow_action,
            &["accept", "return"],
        )?;
        check_one_of("bpfLogLevel", &self.bpf_log_level, BPF_LOG_LEVELS)?;
        check_one_of(
            "bpfExternalServiceMode",
            &self.bpf_external_service_mode,
            BPF_SERVICE_MODES,
        )?;
        check_one_of("routeSource", &self.route_source, ROUTE_SOURCES)?;
        check_one_of("chainInsertMode", &self.chain_insert_mode, CHAIN_INSERT_MODES)?;

        check_range("wireguardListeningPort", self.wireguard_listening_port, 1, 65535)?;
        check_range(
            "wireguardListeningPortV6",
            self.wireguard_listening_port_v6,
            1,
            65535,
        )?;
        check_range(
            "wireguardRoutingRulePriority",
            self.wireguard_routing_rule_priority,
            1,
            32765,
        )?;

        if let Some(range) = self.route_table_range {
            if range.min > range.max {
                return Err(Error::validation_for(
                    "FelixConfiguration",
                    format!("routeTableRange: min {} exceeds max {}", range.min, range.max),
                ));
            }
        }

        if let Some(filter) = self
            .feature_detect_override
            .split(',')
            .filter(|kv| !kv.is_empty())
            .find(|kv| !kv.contains('='))
        {
            return Err(Error::validation_for(
                "FelixConfiguration",
                format!("featureDetectOverride: {filter:?} is not key=value"),
            ));
        }

        for d in [
            &self.route_refresh_interval,
            &self.interface_refresh_interval,
            &self.iptables_refresh_interval,
            &self.iptables_post_write_check_interval,
            &self.iptables_lock_timeout,
            &self.iptables_lock_probe_interval,
            &self.ipsets_refresh_interval,
            &self.xdp_refresh_interval,
            &self.netlink_timeout,
            &self.reporting_interval,
            &self.reporting_ttl,
            &self.endpoint_reporting_delay,
            &self.usage_reporting_initial_delay,
            &self.usage_reporting_interval,
            &self.debug_simulate_calc_graph_hang_after,
            &self.debug_simulate_dataplane_hang_after,
            &self.bpf_kube_proxy_min_sync_period,
            &self.wireguard_persistent_keep_alive,
        ]
        .into_iter()
        .flatten()
        {
            d.parse()?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn bpf_log_level_is_always_serialized() {
        let spec = FelixConfigurationSpec::default();
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!({"bpfLogLevel": ""}));
    }

    #[test]
    fn field_names_match_the_api() {
        let yaml = r#"
apiVersion: crd.projectcalico.org/v1
kind: FelixConfiguration
metadata:
  name: default
spec:
  bpfLogLevel: Info
  ipipMTU: 1440
  vxlanVNI: 4096
  externalNodesList: ["10.0.0.0/24"]
  wireguardKeepAlive: 25s
  awsSrcDstCheck: Disable
  tproxyMode: Enabled
  iptablesBackend: NFT
  nftablesMode: Disabled
  routeTableRange:
    min: 1
    max: 250
  failsafeInboundHostPorts:
    - protocol: tcp
      port: 22
      net: 0.0.0.0/0
  kubeNodePortRanges: ["30000:32767", 8080]
"#;
        let fc: FelixConfiguration = serde_yaml::from_str(yaml).unwrap();
        let spec = &fc.spec;
        assert_eq!(spec.ipip_mtu, Some(1440));
        assert_eq!(spec.vxlan_vni, Some(4096));
        assert_eq!(spec.external_nodes_cidr_list.as_deref(), Some(&["10.0.0.0/24".to_string()][..]));
        assert_eq!(spec.aws_src_dst_check, Some(AWSSrcDstCheckOption::Disable));
        assert_eq!(spec.tproxy_mode, Some(TPROXYModeOption::Enabled));
        assert_eq!(spec.iptables_backend, Some(IptablesBackend::NFTables));
        assert_eq!(spec.nftables_mode, Some(NFTablesMode::Disabled));
        assert_eq!(spec.route_table_range, Some(RouteTableRange { min: 1, max: 250 }));
        assert_eq!(spec.failsafe_inbound_host_ports.as_ref().unwrap()[0].port, 22);
        assert_eq!(
            spec.kube_node_port_ranges.as_ref().unwrap()[1],
            IntOrString::Int(8080)
        );
        assert!(spec.validate().is_ok());

        let json = serde_json::to_value(spec).unwrap();
        assert_eq!(json["wireguardKeepAlive"], "25s");
        assert_eq!(json["iptablesBackend"], "NFT");
        assert!(json.get("ipv6Support").is_none());
    }

    #[rstest]
    #[case("0", 0)]
    #[case("90s", 90_000)]
    #[case("1m30s", 90_000)]
    #[case("1.5h", 5_400_000)]
    #[case("250ms", 250)]
    fn go_durations_parse(#[case] input: &str, #[case] millis: u128) {
        assert_eq!(Duration::from(input).parse().unwrap().as_millis(), millis);
    }

    #[rstest]
    #[case("")]
    #[case("10")]
    #[case("5d")]
    #[case("-1s")]
    #[case("s")]
    fn bad_go_durations_are_rejected(#[case] input: &str) {
        assert!(Duration::from(input).parse().is_err());
    }

    #[test]
    fn wireguard_limits_are_enforced() {
        let spec = FelixConfigurationSpec {
            wireguard_listening_port: Some(0),
            ..Default::default()
        };
        assert!(spec.validate().is_err());

        let spec = FelixConfigurationSpec {
            wireguard_routing_rule_priority: Some(32766),
            ..Default::default()
        };
        assert!(spec.validate().is_err());

        let spec = FelixConfigurationSpec {
            wireguard_listening_port: Some(51820),
            wireguard_routing_rule_priority: Some(99),
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }

    #[rstest]
    #[case(FelixConfigurationSpec { log_severity_screen: "Verbose".into(), ..Default::default() })]
    #[case(FelixConfigurationSpec { default_endpoint_to_host_action: "Reject".into(), ..Default::default() })]
    #[case(FelixConfigurationSpec { iptables_filter_allow_action: "Drop".into(), ..Default::default() })]
    #[case(FelixConfigurationSpec { bpf_log_level: "Trace".into(), ..Default::default() })]
    #[case(FelixConfigurationSpec { route_source: "BGP".into(), ..Default::default() })]
    #[case(FelixConfigurationSpec { route_table_range: Some(RouteTableRange { min: 10, max: 5 }), ..Default::default() })]
    #[case(FelixConfigurationSpec { feature_detect_override: "SNATFullyRandom".into(), ..Default::default() })]
    #[case(FelixConfigurationSpec { reporting_interval: Some("soon".into()), ..Default::default() })]
    fn invalid_values_are_rejected(#[case] spec: FelixConfigurationSpec) {
        assert!(spec.validate().is_err());
    }

    #[test]
    fn enum_values_are_case_insensitive() {
        let spec = FelixConfigurationSpec {
            log_severity_screen: "info".to_string(),
            default_endpoint_to_host_action: "ACCEPT".to_string(),
            route_source: "WorkloadIPs".to_string(),
            feature_detect_override: "SNATFullyRandom=true,MASQFullyRandom=false".to_string(),
            ..Default::default()
        };
        assert!(spec.validate().is_ok());
    }
}
