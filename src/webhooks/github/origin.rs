use std::{convert::Infallible, net::IpAddr};

use anyhow::Context;
use ipnet::IpNet;
use rocket::{
    request::{FromRequest, Outcome},
    Request,
};
use serde::Deserialize;
use tracing::{error, trace, warn};
use url::Url;

pub const X_FORWARDED_FOR: &str = "X-Forwarded-For";

/// Whether `ip` belongs to one of `ranges`.
pub fn is_trusted(ip: IpAddr, ranges: &[IpNet]) -> bool {
    let ip = ip.to_canonical();
    ranges.iter().any(|range| range.contains(&ip))
}

/// Decides which requests come from GitHub.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    /// Networks GitHub sends webhooks from.
    pub trusted_ranges: Vec<IpNet>,
    /// Header carrying the client address when behind a proxy.
    pub forwarded_header: String,
    /// Peers allowed to set `forwarded_header`. If empty, the header is always believed.
    pub trusted_proxies: Vec<IpNet>,
}

impl OriginPolicy {
    pub fn new(trusted_ranges: Vec<IpNet>) -> Self {
        Self {
            trusted_ranges,
            forwarded_header: X_FORWARDED_FOR.to_owned(),
            trusted_proxies: Vec::new(),
        }
    }

    /// Address the request originates from: the forwarding header if present and non-empty (and
    /// its sender is allowed to set it), the peer address otherwise. When the header lists several hops, the
    /// last one, added by the closest proxy, is used.
    ///
    /// `None` if there is no usable address.
    pub fn source_addr(&self, peer: Option<IpAddr>, forwarded: Option<&str>) -> Option<IpAddr> {
        let header_allowed = self.trusted_proxies.is_empty()
            || peer.map_or(false, |peer| is_trusted(peer, &self.trusted_proxies));

        match forwarded {
            Some(header) if header_allowed && !header.trim().is_empty() => {
                let hop = header.rsplit(',').next().unwrap_or_default().trim();
                match hop.parse::<IpAddr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        trace!("couldn't parse forwarded address `{}`", hop);
                        None
                    }
                }
            }
            _ => peer,
        }
    }

    pub fn is_trusted(&self, ip: IpAddr) -> bool {
        is_trusted(ip, &self.trusted_ranges)
    }
}

/// Request guard: where the request comes from and whether that's GitHub. Never fails, untrusted
/// requests are turned down by the route itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOrigin {
    pub addr: Option<IpAddr>,
    pub trusted: bool,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for RequestOrigin {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let policy = match request.rocket().state::<OriginPolicy>() {
            Some(policy) => policy,
            None => {
                error!("no origin policy configured, rejecting request");
                return Outcome::Success(RequestOrigin {
                    addr: None,
                    trusted: false,
                });
            }
        };

        let peer = request.remote().map(|addr| addr.ip());
        let forwarded = request.headers().get_one(&policy.forwarded_header);
        let addr = policy.source_addr(peer, forwarded);
        let trusted = addr.map_or(false, |ip| policy.is_trusted(ip));
        trace!("request from {:?} (peer {:?}), trusted: {}", addr, peer, trusted);

        Outcome::Success(RequestOrigin { addr, trusted })
    }
}

#[derive(Deserialize)]
struct GitHubMeta {
    hooks: Vec<String>,
}

/// Parses CIDR blocks, skipping (and logging) invalid ones.
pub fn parse_ranges<I, S>(ranges: I) -> Vec<IpNet>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    ranges
        .into_iter()
        .filter_map(|range| {
            let range = range.as_ref().trim();
            match range.parse::<IpNet>() {
                Ok(net) => Some(net),
                Err(e) => {
                    warn!("ignoring invalid webhook range `{}`: {}", range, e);
                    None
                }
            }
        })
        .collect()
}

/// Fetches the ranges GitHub sends webhooks from, the `hooks` list of its meta API.
pub async fn fetch_hook_ranges(meta_url: &Url) -> anyhow::Result<Vec<IpNet>> {
    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("couldn't build HTTP client")?;

    let meta: GitHubMeta = client
        .get(meta_url.clone())
        .send()
        .await
        .with_context(|| format!("couldn't reach {}", meta_url))?
        .error_for_status()?
        .json()
        .await
        .context("unexpected response from GitHub meta API")?;

    Ok(parse_ranges(meta.hooks))
}
