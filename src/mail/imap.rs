//! IMAP over implicit TLS.

use std::fmt;
use std::net::TcpStream;

use native_tls::{TlsConnector, TlsStream};
use tracing::{debug, info};

use crate::error::{HarvestError, Result};
use crate::mail::{MailSource, MessageRef};

/// Everything needed to open a session. Resolved once, in `main`.
#[derive(Clone)]
pub struct ImapParams {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
}

impl fmt::Debug for ImapParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapParams")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("mailbox", &self.mailbox)
            .finish()
    }
}

/// An authenticated session with one folder selected.
pub struct ImapSource {
    server: String,
    session: Option<imap::Session<TlsStream<TcpStream>>>,
}

impl ImapSource {
    /// Connect, log in, and select `params.mailbox`.
    ///
    /// Any failure here is a `Connection` error.
    pub fn connect(params: &ImapParams) -> Result<Self> {
        let fail = |reason: String| HarvestError::Connection {
            server: format!("{}:{}", params.server, params.port),
            reason,
        };

        let tls = TlsConnector::builder()
            .build()
            .map_err(|e| fail(format!("TLS setup failed: {e}")))?;

        debug!(server = %params.server, port = params.port, "Connecting");
        let client = imap::connect((params.server.as_str(), params.port), &params.server, &tls)
            .map_err(|e| fail(e.to_string()))?;

        let mut session = client
            .login(&params.username, &params.password)
            .map_err(|(e, _client)| fail(format!("login failed: {e}")))?;

        let mailbox = match session.select(&params.mailbox) {
            Ok(mailbox) => mailbox,
            Err(e) => {
                let _ = session.logout();
                return Err(fail(format!("cannot select '{}': {e}", params.mailbox)));
            }
        };

        info!(
            server = %params.server,
            mailbox = %params.mailbox,
            exists = mailbox.exists,
            "Connected"
        );

        Ok(Self {
            server: params.server.clone(),
            session: Some(session),
        })
    }

    fn session(&mut self) -> Result<&mut imap::Session<TlsStream<TcpStream>>> {
        let server = &self.server;
        self.session.as_mut().ok_or_else(|| HarvestError::Connection {
            server: server.clone(),
            reason: "session already closed".into(),
        })
    }
}

impl MailSource for ImapSource {
    fn list(&mut self) -> Result<Vec<MessageRef>> {
        let mut seqs: Vec<u32> = self.session()?.search("ALL")?.into_iter().collect();
        seqs.sort_unstable();
        Ok(seqs.into_iter().map(|s| MessageRef(s.to_string())).collect())
    }

    fn fetch(&mut self, id: &MessageRef) -> Result<Vec<u8>> {
        let fetches = self.session()?.fetch(&id.0, "RFC822")?;
        fetches
            .iter()
            .find_map(|f| f.body())
            .map(<[u8]>::to_vec)
            .ok_or_else(|| HarvestError::Mime(format!("server returned no body for message {id}")))
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.logout()?;
            info!(server = %self.server, "Logged out");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(port: u16) -> ImapParams {
        ImapParams {
            server: "127.0.0.1".into(),
            port,
            username: "builds".into(),
            password: "s3cret".into(),
            mailbox: "INBOX".into(),
        }
    }

    #[test]
    fn test_debug_redacts_password() {
        let out = format!("{:?}", params(993));
        assert!(!out.contains("s3cret"));
        assert!(out.contains("127.0.0.1"));
    }

    #[test]
    fn test_unreachable_server_is_connection_error() {
        // Bind then drop a listener to get a port nothing is listening on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .map(|a| a.port())
            .unwrap();
        let err = ImapSource::connect(&params(port)).err().expect("nothing listening");
        assert!(err.is_connection(), "{err}");
        assert!(err.is_fatal());
    }
}
