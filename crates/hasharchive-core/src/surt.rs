//! Sort-friendly URI Reordering Transform.
//!
//! `https://www.Example.com:8080/a?b=1#f` becomes `https://(com,example,):8080/a?b=1`,
//! so byte order over SURT strings groups URLs by domain hierarchy.

use url::{Host, Url};

use crate::error::AppError;

/// Normalize `raw` into its SURT index key.
pub fn surt(raw: &str) -> Result<String, AppError> {
    let url = Url::parse(raw.trim()).map_err(|e| AppError::InvalidUrl(format!("{raw}: {e}")))?;

    let Some(host) = url.host() else {
        // Hostless URLs (mailto:, data:) have nothing to reorder.
        let mut s = url.to_string();
        if let Some(pos) = s.find('#') {
            s.truncate(pos);
        }
        return Ok(s);
    };

    let mut out = String::with_capacity(raw.len() + 4);
    out.push_str(url.scheme());
    out.push_str("://(");
    match host {
        Host::Domain(domain) => {
            let mut labels: Vec<&str> = domain
                .trim_end_matches('.')
                .split('.')
                .filter(|l| !l.is_empty())
                .collect();
            if labels.len() > 2 && labels[0] == "www" {
                labels.remove(0);
            }
            for label in labels.iter().rev() {
                out.push_str(label);
                out.push(',');
            }
        }
        Host::Ipv4(addr) => {
            out.push_str(&addr.to_string());
            out.push(',');
        }
        Host::Ipv6(addr) => {
            out.push('[');
            out.push_str(&addr.to_string());
            out.push_str("],");
        }
    }
    out.push(')');

    if let Some(port) = url.port() {
        out.push(':');
        out.push_str(&port.to_string());
    }
    out.push_str(url.path());
    if let Some(query) = url.query() {
        out.push('?');
        out.push_str(query);
    }
    Ok(out)
}
