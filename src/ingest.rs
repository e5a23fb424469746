//! The ingest run: list, fetch, decode, route, for every message in the folder.
//!
//! Errors are contained at the narrowest boundary. A failed attachment never
//! stops its message, and a failed message never stops the run. Only a
//! failure to list the folder (or to connect at all) is fatal.

use std::path::PathBuf;

use tracing::{debug, error, info, warn};

use crate::archive::files::ConflictPolicy;
use crate::archive::ArchiveLayout;
use crate::error::{HarvestError, Result};
use crate::mail::imap::{ImapParams, ImapSource};
use crate::mail::{MailSource, MessageRef};
use crate::model::attachment::Attachment;
use crate::model::summary::RunSummary;
use crate::parser::mime;
use crate::router::{self, Routed, RoutingTable, Strategy};

/// Processing settings for one run, passed explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the destination tree. Must already exist.
    pub dest_root: PathBuf,
    pub routing: RoutingTable,
    pub layout: ArchiveLayout,
    pub conflict: ConflictPolicy,
}

/// Connect to the IMAP server and ingest the selected folder.
pub fn run_imap(
    params: &ImapParams,
    settings: &Settings,
    progress: &dyn Fn(usize, usize),
) -> Result<RunSummary> {
    check_dest_root(settings)?;
    let source = ImapSource::connect(params)?;
    ingest_session(source, settings, progress)
}

/// Ingest everything `source` lists, then close it.
///
/// The source is closed even when ingestion fails; a failure to close is
/// logged and otherwise ignored.
pub fn ingest_session<S: MailSource>(
    mut source: S,
    settings: &Settings,
    progress: &dyn Fn(usize, usize),
) -> Result<RunSummary> {
    let result = ingest_mailbox(&mut source, settings, progress);
    if let Err(e) = source.close() {
        warn!(error = %e, "Failed to close mail session");
    }
    result
}

/// Process every message `source` lists. The caller owns the session lifecycle.
pub fn ingest_mailbox<S: MailSource + ?Sized>(
    source: &mut S,
    settings: &Settings,
    progress: &dyn Fn(usize, usize),
) -> Result<RunSummary> {
    check_dest_root(settings)?;
    debug!(
        rules = ?settings.routing.iter().collect::<Vec<_>>(),
        dest = %settings.dest_root.display(),
        "Routing table"
    );

    let refs = source.list()?;
    info!(count = refs.len(), "Found messages in mailbox");

    let mut summary = RunSummary {
        messages_found: refs.len(),
        ..Default::default()
    };
    let total = refs.len();

    for (i, id) in refs.iter().enumerate() {
        progress(i, total);
        if let Err(e) = process_message(source, id, settings, &mut summary) {
            error!(message = %id, error = %e, "Failed to process message");
            summary.messages_failed += 1;
        }
    }
    progress(total, total);

    info!(
        messages = summary.messages_found,
        failed = summary.messages_failed,
        saved = summary.scripts_saved,
        archives = summary.archives_extracted,
        "Run complete"
    );
    Ok(summary)
}

fn process_message<S: MailSource + ?Sized>(
    source: &mut S,
    id: &MessageRef,
    settings: &Settings,
    summary: &mut RunSummary,
) -> Result<()> {
    let raw = source.fetch(id)?;
    let attachments = mime::extract_attachments(&raw)?;
    debug!(message = %id, attachments = attachments.len(), "Decoded message");

    for attachment in &attachments {
        summary.attachments_seen += 1;
        process_attachment(attachment, settings, summary);
    }
    Ok(())
}

fn process_attachment(attachment: &Attachment, settings: &Settings, summary: &mut RunSummary) {
    let name = attachment.filename.as_deref().unwrap_or("<unnamed>");

    match router::route_attachment(attachment, settings) {
        Ok(Routed::Saved { bytes, .. }) => {
            summary.scripts_saved += 1;
            summary.bytes_written += bytes;
        }
        Ok(Routed::Distributed(stats)) => {
            summary.record_distribution(&stats);
        }
        Ok(Routed::Ignored) => {
            summary.attachments_ignored += 1;
        }
        Err(e) if is_archive(attachment, settings) => {
            error!(filename = %name, error = %e, "Failed to extract archive");
            summary.archives_failed += 1;
        }
        Err(e) => {
            error!(filename = %name, error = %e, "Failed to save attachment");
            summary.attachments_failed += 1;
        }
    }
}

fn is_archive(attachment: &Attachment, settings: &Settings) -> bool {
    attachment
        .filename
        .as_deref()
        .and_then(|n| settings.routing.lookup(n))
        == Some(Strategy::Extract)
}

fn check_dest_root(settings: &Settings) -> Result<()> {
    if settings.dest_root.is_dir() {
        Ok(())
    } else {
        Err(HarvestError::config(
            "general.dest_root",
            format!("'{}' is not a directory", settings.dest_root.display()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// In-memory source; `None` entries fail to fetch.
    struct FakeSource {
        messages: Vec<Option<Vec<u8>>>,
        closed: Rc<Cell<bool>>,
        fail_list: bool,
    }

    impl MailSource for FakeSource {
        fn list(&mut self) -> Result<Vec<MessageRef>> {
            if self.fail_list {
                return Err(HarvestError::Connection {
                    server: "fake".into(),
                    reason: "dropped".into(),
                });
            }
            Ok((1..=self.messages.len())
                .map(|i| MessageRef(i.to_string()))
                .collect())
        }

        fn fetch(&mut self, id: &MessageRef) -> Result<Vec<u8>> {
            let idx: usize = id.0.parse::<usize>().unwrap() - 1;
            self.messages[idx]
                .clone()
                .ok_or_else(|| HarvestError::Mime(format!("fetch of {id} failed")))
        }

        fn close(&mut self) -> Result<()> {
            self.closed.set(true);
            Err(HarvestError::Connection {
                server: "fake".into(),
                reason: "logout refused".into(),
            })
        }
    }

    fn settings(dest: &std::path::Path) -> Settings {
        Settings {
            dest_root: dest.to_path_buf(),
            routing: RoutingTable::default(),
            layout: ArchiveLayout::default(),
            conflict: ConflictPolicy::Overwrite,
        }
    }

    fn js_message(name: &str) -> Vec<u8> {
        format!(
            "Subject: build\r\n\
             Content-Type: multipart/mixed; boundary=\"B\"\r\n\r\n\
             --B\r\n\
             Content-Type: application/javascript\r\n\
             Content-Disposition: attachment; filename=\"{name}\"\r\n\r\n\
             run();\r\n\
             --B--\r\n"
        )
        .into_bytes()
    }

    #[test]
    fn test_failed_message_does_not_stop_run_and_close_is_quiet() {
        let dest = tempfile::tempdir().unwrap();
        let closed = Rc::new(Cell::new(false));
        let source = FakeSource {
            messages: vec![None, Some(js_message("a.js")), Some(b"   ".to_vec())],
            closed: Rc::clone(&closed),
            fail_list: false,
        };

        let summary = ingest_session(source, &settings(dest.path()), &|_, _| {}).unwrap();
        assert!(closed.get());
        assert_eq!(summary.messages_found, 3);
        assert_eq!(summary.messages_failed, 2);
        assert_eq!(summary.scripts_saved, 1);
        assert!(dest.path().join("a_js").is_file());
    }

    #[test]
    fn test_list_failure_is_fatal_but_closes() {
        let dest = tempfile::tempdir().unwrap();
        let closed = Rc::new(Cell::new(false));
        let source = FakeSource {
            messages: vec![],
            closed: Rc::clone(&closed),
            fail_list: true,
        };
        let err = ingest_session(source, &settings(dest.path()), &|_, _| {}).unwrap_err();
        assert!(err.is_fatal());
        assert!(closed.get());
    }

    #[test]
    fn test_progress_reports_total() {
        let dest = tempfile::tempdir().unwrap();
        let mut source = FakeSource {
            messages: vec![Some(js_message("a.js")), Some(js_message("b.js"))],
            closed: Rc::new(Cell::new(false)),
            fail_list: false,
        };
        let last = Cell::new((0, 0));
        ingest_mailbox(&mut source, &settings(dest.path()), &|cur, total| {
            last.set((cur, total))
        })
        .unwrap();
        assert_eq!(last.get(), (2, 2));
    }

    #[test]
    fn test_missing_dest_root_is_config_error() {
        let dest = tempfile::tempdir().unwrap();
        let mut source = FakeSource {
            messages: vec![],
            closed: Rc::new(Cell::new(false)),
            fail_list: false,
        };
        let err = ingest_mailbox(&mut source, &settings(&dest.path().join("nope")), &|_, _| {})
            .unwrap_err();
        assert!(err.is_config());
    }
}
