// ── Route descriptors ──
//
// Structured form of one `ip route` line. Every field is parsed and
// validated on the way in; on the way out a descriptor only ever becomes
// an argument vector for `ip`, never a shell string.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::addressing::PeerSubnet;
use crate::error::CoreError;

/// Keys whose value we read past without keeping.
const IGNORED_VALUE_KEYS: &[&str] = &[
    "table", "pref", "expires", "mtu", "advmss", "hoplimit", "weight", "realm",
];

/// Bare flags we read past without keeping.
const IGNORED_FLAGS: &[&str] = &["linkdown", "dead", "pervasive", "offload", "rt_offload"];

/// Kernel interface names are at most 15 bytes.
const MAX_IFNAME_LEN: usize = 15;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Default,
    /// `address/len` or a bare host address.
    Prefix(String),
}

impl Destination {
    fn parse(token: &str) -> Result<Self, String> {
        if token == "default" {
            return Ok(Self::Default);
        }
        let (addr, len) = match token.split_once('/') {
            Some((addr, len)) => (addr, Some(len)),
            None => (token, None),
        };
        let ip: IpAddr = addr
            .parse()
            .map_err(|_| format!("'{token}' is not a destination"))?;
        if let Some(len) = len {
            let max = if ip.is_ipv4() { 32 } else { 128 };
            match len.parse::<u8>() {
                Ok(n) if n <= max => {}
                _ => return Err(format!("'{token}' has an invalid prefix length")),
            }
        }
        Ok(Self::Prefix(token.to_owned()))
    }
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Prefix(p) => f.write_str(p),
        }
    }
}

/// One route, as reported by `ip route`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteDescriptor {
    pub destination: Destination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub onlink: bool,
}

fn valid_interface(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_IFNAME_LEN
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '-' | '@'))
}

fn valid_word(word: &str) -> bool {
    !word.is_empty()
        && !word.starts_with('-')
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-'))
}

impl RouteDescriptor {
    /// Route for a prefix through an interface, with nothing else set.
    pub fn via_device(destination: Destination, interface: &str) -> Self {
        Self {
            destination,
            gateway: None,
            interface: Some(interface.to_owned()),
            metric: None,
            protocol: None,
            source: None,
            scope: None,
            onlink: false,
        }
    }

    /// The peer subnet routed through the tunnel device.
    pub fn subnet_route(subnet: PeerSubnet, interface: &str) -> Self {
        Self::via_device(Destination::Prefix(subnet.to_string()), interface)
    }

    pub fn is_default(&self) -> bool {
        self.destination == Destination::Default
    }

    pub fn uses_interface(&self, interface: &str) -> bool {
        self.interface.as_deref() == Some(interface)
    }

    /// Re-check every field. Used for descriptors that did not come
    /// through the parser (deserialized snapshots).
    pub fn validate(&self) -> Result<(), CoreError> {
        let input = self.to_string();
        if let Destination::Prefix(ref p) = self.destination {
            Destination::parse(p).map_err(|e| CoreError::invalid_route(&input, e))?;
        }
        if let Some(ref dev) = self.interface {
            if !valid_interface(dev) {
                return Err(CoreError::invalid_route(&input, format!("bad interface name '{dev}'")));
            }
        }
        for (what, word) in [("protocol", &self.protocol), ("scope", &self.scope)] {
            if let Some(w) = word {
                if !valid_word(w) {
                    return Err(CoreError::invalid_route(&input, format!("bad {what} '{w}'")));
                }
            }
        }
        Ok(())
    }

    /// Selector and attributes, without the leading verb.
    fn spec_args(&self, with_attributes: bool) -> Vec<String> {
        let mut args = vec![self.destination.to_string()];
        if let Some(gw) = self.gateway {
            args.extend(["via".to_owned(), gw.to_string()]);
        }
        if let Some(ref dev) = self.interface {
            args.extend(["dev".to_owned(), dev.clone()]);
        }
        if let Some(metric) = self.metric {
            args.extend(["metric".to_owned(), metric.to_string()]);
        }
        if with_attributes {
            if let Some(ref proto) = self.protocol {
                args.extend(["proto".to_owned(), proto.clone()]);
            }
            if let Some(ref scope) = self.scope {
                args.extend(["scope".to_owned(), scope.clone()]);
            }
            if let Some(src) = self.source {
                args.extend(["src".to_owned(), src.to_string()]);
            }
            if self.onlink {
                args.push("onlink".to_owned());
            }
        }
        args
    }

    /// Arguments to `ip` that install this route.
    pub fn add_args(&self) -> Vec<String> {
        let mut args = vec!["route".to_owned(), "replace".to_owned()];
        args.extend(self.spec_args(true));
        args
    }

    /// Arguments to `ip` that list this route if it is installed.
    pub fn show_args(&self) -> Vec<String> {
        let mut args = vec!["route".to_owned(), "show".to_owned(), "exact".to_owned()];
        args.extend(self.spec_args(false));
        args
    }

    /// Arguments to `ip` that remove this route.
    pub fn delete_args(&self) -> Vec<String> {
        let mut args = vec!["route".to_owned(), "del".to_owned()];
        args.extend(self.spec_args(false));
        args
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.spec_args(true).join(" "))
    }
}

impl FromStr for RouteDescriptor {
    type Err = CoreError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fail = |reason: String| CoreError::invalid_route(line.trim(), reason);
        let mut tokens = line.split_whitespace();

        let first = tokens.next().ok_or_else(|| fail("empty line".into()))?;
        let destination = Destination::parse(first).map_err(fail)?;
        let mut route = Self {
            destination,
            gateway: None,
            interface: None,
            metric: None,
            protocol: None,
            source: None,
            scope: None,
            onlink: false,
        };

        while let Some(token) = tokens.next() {
            let mut value = |key: &str| {
                tokens
                    .next()
                    .ok_or_else(|| fail(format!("'{key}' without a value")))
            };
            match token {
                "via" => {
                    let mut raw = value("via")?;
                    if raw == "inet" || raw == "inet6" {
                        raw = value("via")?;
                    }
                    route.gateway = Some(
                        raw.parse()
                            .map_err(|_| fail(format!("bad gateway '{raw}'")))?,
                    );
                }
                "dev" => {
                    let dev = value("dev")?;
                    if !valid_interface(dev) {
                        return Err(fail(format!("bad interface name '{dev}'")));
                    }
                    route.interface = Some(dev.to_owned());
                }
                "metric" => {
                    let raw = value("metric")?;
                    route.metric = Some(
                        raw.parse()
                            .map_err(|_| fail(format!("bad metric '{raw}'")))?,
                    );
                }
                "proto" | "scope" => {
                    let word = value(token)?;
                    if !valid_word(word) {
                        return Err(fail(format!("bad {token} '{word}'")));
                    }
                    if token == "proto" {
                        route.protocol = Some(word.to_owned());
                    } else {
                        route.scope = Some(word.to_owned());
                    }
                }
                "src" => {
                    let raw = value("src")?;
                    route.source = Some(
                        raw.parse()
                            .map_err(|_| fail(format!("bad source '{raw}'")))?,
                    );
                }
                "onlink" => route.onlink = true,
                key if IGNORED_VALUE_KEYS.contains(&key) => {
                    value(key)?;
                }
                flag if IGNORED_FLAGS.contains(&flag) => {}
                other => return Err(fail(format!("unexpected token '{other}'"))),
            }
        }

        Ok(route)
    }
}

/// Parse every non-empty line of `ip route` output.
pub fn parse_routes(output: &str) -> Result<Vec<RouteDescriptor>, CoreError> {
    output
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(str::parse)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::net::Ipv4Addr;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_typical_default_route() {
        let route: RouteDescriptor = "default via 192.168.1.1 dev eth0 proto dhcp src 192.168.1.50 metric 100"
            .parse()
            .unwrap();

        assert!(route.is_default());
        assert_eq!(route.gateway, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1))));
        assert_eq!(route.interface.as_deref(), Some("eth0"));
        assert_eq!(route.protocol.as_deref(), Some("dhcp"));
        assert_eq!(route.source, Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50))));
        assert_eq!(route.metric, Some(100));
        assert_eq!(
            route.add_args(),
            vec![
                "route", "replace", "default", "via", "192.168.1.1", "dev", "eth0", "metric",
                "100", "proto", "dhcp", "src", "192.168.1.50"
            ]
        );
        assert_eq!(
            route.delete_args(),
            vec![
                "route", "del", "default", "via", "192.168.1.1", "dev", "eth0", "metric", "100"
            ]
        );
    }

    #[test]
    fn skips_ignored_keys_and_flags() {
        let route: RouteDescriptor = "10.0.0.0/8 dev wg0 scope link table main pref medium linkdown"
            .parse()
            .unwrap();
        assert_eq!(route.destination, Destination::Prefix("10.0.0.0/8".into()));
        assert_eq!(route.scope.as_deref(), Some("link"));
        assert_eq!(route.to_string(), "10.0.0.0/8 dev wg0 scope link");
    }

    #[test]
    fn display_reparses_to_the_same_route() {
        let line = "default via 10.1.0.1 dev enp3s0 metric 600 proto static onlink";
        let route: RouteDescriptor = line.parse().unwrap();
        let again: RouteDescriptor = route.to_string().parse().unwrap();
        assert_eq!(route, again);
        assert!(again.onlink);
    }

    #[test]
    fn rejects_injection_attempts() {
        for line in [
            "default via 1.1.1.1 dev eth0; rm -rf /",
            "default via $(reboot) dev eth0",
            "default dev -v",
            "default via 1.1.1.1 dev averyveryverylongname0",
            "blackhole 10.0.0.0/8",
            "default metric",
            "10.0.0.0/99 dev eth0",
        ] {
            assert!(line.parse::<RouteDescriptor>().is_err(), "accepted: {line}");
        }
    }

    #[test]
    fn validate_catches_tampered_fields() {
        let mut route = RouteDescriptor::subnet_route(PeerSubnet::DEFAULT, "wg0");
        assert!(route.validate().is_ok());
        route.interface = Some("wg0 up".into());
        assert!(route.validate().is_err());
    }

    #[test]
    fn parses_multi_line_output() {
        let out = "default via 192.168.1.1 dev eth0 proto dhcp metric 100\n\
                   default via 192.168.2.1 dev wlan0 proto dhcp metric 600\n\n";
        let routes = parse_routes(out).unwrap();
        assert_eq!(routes.len(), 2);
        assert!(routes[1].uses_interface("wlan0"));
    }

    #[test]
    fn show_args_select_the_exact_route() {
        let route = RouteDescriptor::subnet_route(PeerSubnet::DEFAULT, "wg0");
        assert_eq!(
            route.show_args(),
            vec!["route", "show", "exact", "10.77.0.0/24", "dev", "wg0"]
        );
    }
}
