use std::net::{IpAddr, SocketAddr};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::{header::FORWARDED, request::Parts},
};
use forwarded_header_value::ForwardedHeaderValue;
use tracing::error;

use crate::http_err::InternalServerError;

/// Peers allowed to report the client address through a `Forwarded` header.
#[derive(Clone, Debug, Default)]
pub struct TrustedProxies(Vec<IpAddr>);

impl TrustedProxies {
    pub fn new(proxies: Vec<IpAddr>) -> Self {
        Self(proxies)
    }

    fn contains(&self, ip: &IpAddr) -> bool {
        self.0.contains(ip)
    }
}

/// The IP address of the client that made a request.
///
/// This is the peer address of the connection unless the peer is a trusted
/// proxy. In that case the `Forwarded` header is walked from the nearest hop
/// outwards and the first address that is not a trusted proxy is used.
#[derive(Debug)]
pub struct ClientIp(pub IpAddr);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    TrustedProxies: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = InternalServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let peer = match parts.extensions.get::<ConnectInfo<SocketAddr>>() {
            Some(ConnectInfo(addr)) => addr.ip(),
            None => {
                error!("Request has no connection info.");

                return Err(InternalServerError::default());
            }
        };

        let proxies = TrustedProxies::from_ref(state);
        if !proxies.contains(&peer) {
            return Ok(Self(peer));
        }

        Ok(Self(forwarded_ip(parts, &proxies).unwrap_or(peer)))
    }
}

fn forwarded_ip(parts: &Parts, proxies: &TrustedProxies) -> Option<IpAddr> {
    let header = parts.headers.get(FORWARDED)?.to_str().ok()?;
    let forwarded = ForwardedHeaderValue::from_forwarded(header).ok()?;

    forwarded
        .iter()
        .rev()
        .filter_map(|stanza| stanza.forwarded_for_ip())
        .find(|ip| !proxies.contains(ip))
        .or_else(|| forwarded.remotest_forwarded_for_ip())
}

#[cfg(test)]
mod test {
    use axum::http::Request;

    use super::*;

    const PROXY: &str = "10.0.0.2";

    fn proxies() -> TrustedProxies {
        TrustedProxies::new(vec![PROXY.parse().unwrap(), "10.0.0.3".parse().unwrap()])
    }

    fn request(peer: &str, forwarded: Option<&str>) -> Request<()> {
        let mut builder = Request::builder();
        if let Some(forwarded) = forwarded {
            builder = builder.header(FORWARDED, forwarded);
        }

        let mut request = builder.body(()).unwrap();
        request.extensions_mut().insert(ConnectInfo(
            SocketAddr::new(peer.parse().unwrap(), 4321),
        ));

        request
    }

    async fn extract(request: Request<()>) -> Result<ClientIp, InternalServerError> {
        let (mut parts, _) = request.into_parts();

        ClientIp::from_request_parts(&mut parts, &proxies()).await
    }

    #[tokio::test]
    async fn uses_forwarded_address_from_trusted_proxy() {
        let request = request(PROXY, Some("for=192.0.2.60;proto=https"));

        let ClientIp(ip) = extract(request).await.expect("ip should be extracted");

        assert_eq!("192.0.2.60".parse::<IpAddr>().unwrap(), ip);
    }

    #[tokio::test]
    async fn skips_client_supplied_forwarded_entries() {
        let request = request(
            PROXY,
            Some("for=203.0.113.250, for=198.51.100.17, for=10.0.0.3"),
        );

        let ClientIp(ip) = extract(request).await.expect("ip should be extracted");

        assert_eq!("198.51.100.17".parse::<IpAddr>().unwrap(), ip);
    }

    #[tokio::test]
    async fn ignores_forwarded_header_from_untrusted_peer() {
        let request = request("203.0.113.9", Some("for=192.0.2.60"));

        let ClientIp(ip) = extract(request).await.expect("ip should be extracted");

        assert_eq!("203.0.113.9".parse::<IpAddr>().unwrap(), ip);
    }

    #[tokio::test]
    async fn trusted_proxy_without_header_is_the_client() {
        let ClientIp(ip) = extract(request(PROXY, None))
            .await
            .expect("ip should be extracted");

        assert_eq!(PROXY.parse::<IpAddr>().unwrap(), ip);
    }

    #[tokio::test]
    async fn rejects_request_without_connection_info() {
        let request = Request::builder()
            .header(FORWARDED, "for=192.0.2.60")
            .body(())
            .unwrap();

        assert!(extract(request).await.is_err());
    }
}
