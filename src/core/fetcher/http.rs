//! HTTP content fetcher backed by a blocking reqwest client.

use super::{ContentFetcher, FetchConfig};
use crate::core::media::MediaItem;
use crate::error::{ClusterEngineError, FetchError};
use reqwest::blocking::Client;
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};

/// Fetches item content over HTTP(S) with a bearer credential
pub struct HttpFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpFetcher {
    /// Build a fetcher; fails only if the HTTP client cannot be constructed
    pub fn new(config: FetchConfig) -> Result<Self, ClusterEngineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClusterEngineError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else if let Some(status) = error.status() {
            FetchError::Status {
                status: status.as_u16(),
            }
        } else {
            FetchError::Transport(error.to_string())
        }
    }

    /// Check a download URL before any credential is sent to it.
    ///
    /// `host.docker.internal` is always refused. Unless local targets are
    /// allowed, the scheme must be https and every resolved address must be
    /// globally routable.
    fn validate(&self, raw: &str) -> Result<Url, FetchError> {
        let url = Url::parse(raw).map_err(|e| FetchError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing hostname".to_string(),
            })?
            .to_ascii_lowercase();

        if host == "host.docker.internal" {
            return Err(FetchError::HostNotAllowed { host });
        }
        let local = self.config.allow_local_targets;
        if url.scheme() != "https" && !local {
            return Err(FetchError::InsecureScheme {
                url: raw.to_string(),
            });
        }
        if !self.config.host_allowed(&host) {
            tracing::warn!(host = %host, "rejected download host");
            return Err(FetchError::HostNotAllowed { host });
        }
        if !local {
            reject_non_global(&url, &host)?;
        }
        Ok(url)
    }
}

fn reject_non_global(url: &Url, host: &str) -> Result<(), FetchError> {
    let literal = host.trim_start_matches('[').trim_end_matches(']');
    let addresses: Vec<IpAddr> = match literal.parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => {
            let port = url.port_or_known_default().unwrap_or(443);
            (host, port)
                .to_socket_addrs()
                .map_err(|e| FetchError::Transport(format!("cannot resolve {}: {}", host, e)))?
                .map(|addr| addr.ip())
                .collect()
        }
    };

    if addresses.iter().any(|ip| !is_global(ip)) {
        tracing::warn!(host, "rejected non-global download address");
        return Err(FetchError::NonGlobalAddress {
            host: host.to_string(),
        });
    }
    Ok(())
}

/// Whether an address is publicly routable
pub(crate) fn is_global(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_global_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_global_v4(&v4),
            None => is_global_v6(v6),
        },
    }
}

fn is_global_v4(ip: &Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || ip.is_multicast()
        // 100.64.0.0/10 shared address space
        || (a == 100 && (b & 0xc0) == 64)
        // 192.0.0.0/24 protocol assignments
        || (a == 192 && b == 0 && ip.octets()[2] == 0)
        // 198.18.0.0/15 benchmarking
        || (a == 198 && (b & 0xfe) == 18)
        // 240.0.0.0/4 reserved
        || a >= 240)
}

fn is_global_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    !(ip.is_unspecified()
        || ip.is_loopback()
        || ip.is_multicast()
        // fc00::/7 unique local
        || (first & 0xfe00) == 0xfc00
        // fe80::/10 link local
        || (first & 0xffc0) == 0xfe80
        // 2001:db8::/32 documentation
        || (first == 0x2001 && ip.segments()[1] == 0x0db8))
}

impl ContentFetcher for HttpFetcher {
    fn fetch(&self, item: &MediaItem) -> Result<Vec<u8>, FetchError> {
        let raw = self
            .config
            .content_url(item)
            .ok_or(FetchError::MissingSourceUrl)?;
        let url = self.validate(&raw)?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().map_err(|e| self.classify(e))?;
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
