//! Account and proxy list files.
//!
//! Both are plain text, one entry per line. Blank lines and lines starting
//! with `#` are skipped.

use std::path::Path;
use std::sync::Arc;

use sprout_session::Signer;
use sprout_transport::ProxyUri;

use crate::{LocalSigner, SproutError};

fn entries(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

fn read(path: &Path) -> Result<String, SproutError> {
    std::fs::read_to_string(path).map_err(|source| SproutError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Private keys from `text`. Lines without a `0x` prefix are skipped.
pub fn parse_accounts(text: &str) -> Vec<String> {
    entries(text)
        .filter_map(|(line_no, line)| {
            if line.starts_with("0x") {
                Some(line.to_owned())
            } else {
                tracing::warn!(line = line_no, "skipping account entry without 0x prefix");
                None
            }
        })
        .collect()
}

/// Loads one signer per private key in the file at `path`.
pub fn load_signers(path: &Path) -> Result<Vec<Arc<dyn Signer>>, SproutError> {
    let keys = parse_accounts(&read(path)?);
    let signers = keys
        .iter()
        .enumerate()
        .map(|(i, key)| {
            LocalSigner::from_hex(key)
                .map(|s| Arc::new(s) as Arc<dyn Signer>)
                .map_err(|e| SproutError::Config(format!("account #{}: {e}", i + 1)))
        })
        .collect::<Result<Vec<_>, _>>()?;
    tracing::info!(path = %path.display(), accounts = signers.len(), "loaded accounts");
    Ok(signers)
}

/// Proxies from `text`. Entries without a scheme are taken as `http://`.
///
/// `http`, `https`, `socks4` and `socks5` proxies are accepted. Lines that do
/// not parse are skipped with a warning; the list must not end up empty.
pub fn parse_proxies(text: &str) -> Result<Vec<ProxyUri>, SproutError> {
    let proxies: Vec<ProxyUri> = entries(text)
        .filter_map(|(line_no, line)| match ProxyUri::parse(line) {
            Ok(proxy) => Some(proxy),
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "skipping proxy entry");
                None
            }
        })
        .collect();
    if proxies.is_empty() {
        return Err(SproutError::Config("no valid proxies found".into()));
    }
    Ok(proxies)
}

/// Loads the proxy list at `path`.
pub fn load_proxies(path: &Path) -> Result<Vec<ProxyUri>, SproutError> {
    let proxies = parse_proxies(&read(path)?)?;
    tracing::debug!(path = %path.display(), proxies = proxies.len(), "loaded proxies");
    Ok(proxies)
}
