// ABOUTME: PostgreSQL connection establishment with TLS
// ABOUTME: Process-wide TLS policy plus a connect helper that drives the connection task

use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use tokio_postgres::Client;

static ALLOW_SELF_SIGNED: OnceLock<bool> = OnceLock::new();

/// Set the TLS policy once at startup.
///
/// Later calls are ignored. When never called, certificates are verified.
pub fn init_tls_policy(allow_self_signed_certs: bool) {
    if ALLOW_SELF_SIGNED.set(allow_self_signed_certs).is_err() {
        tracing::debug!("TLS policy already initialized, ignoring");
    }
    if allow_self_signed_certs {
        tracing::warn!("TLS certificate verification is disabled (--allow-self-signed-certs)");
    }
}

fn allow_self_signed() -> bool {
    *ALLOW_SELF_SIGNED.get().unwrap_or(&false)
}

fn make_tls_connector() -> Result<MakeTlsConnector> {
    let mut builder = TlsConnector::builder();
    if allow_self_signed() {
        builder
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true);
    }
    let connector = builder.build().context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(connector))
}

/// Connect to PostgreSQL.
///
/// TLS negotiation follows the URL's `sslmode` (tokio-postgres defaults to
/// `prefer`). The connection task is spawned on the current runtime and ends
/// when the returned client is dropped.
pub async fn connect(url: &str) -> Result<Client> {
    let tls = make_tls_connector()?;
    let (client, connection) = tokio_postgres::connect(url, tls)
        .await
        .context("Failed to establish PostgreSQL connection")?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });

    Ok(client)
}
