//! MIME message parsing: attachment selection.

use mail_parser::{Message, MessageParser, MimeHeaders, PartType};

use crate::error::{HarvestError, Result};
use crate::model::attachment::Attachment;

/// Maximum depth of embedded `message/rfc822` parts followed (to prevent
/// runaway recursion on adversarial input).
const MAX_DEPTH: usize = 10;

/// Parse a complete raw message and return every part marked as an attachment.
///
/// Parts are visited across all multipart levels and inside embedded
/// messages. A part qualifies only if its content-disposition is exactly
/// `attachment`; inline parts and bodies never do.
pub fn extract_attachments(raw_message: &[u8]) -> Result<Vec<Attachment>> {
    let message_bytes = skip_from_line(raw_message);
    if message_bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(HarvestError::Mime("message is empty".into()));
    }

    let msg = MessageParser::default()
        .parse(message_bytes)
        .ok_or_else(|| HarvestError::Mime("failed to parse message".into()))?;

    let mut result = Vec::new();
    collect_attachments(&msg, 0, &mut result);
    Ok(result)
}

fn collect_attachments(msg: &Message<'_>, depth: usize, out: &mut Vec<Attachment>) {
    for part in &msg.parts {
        if is_attachment(part) {
            out.push(Attachment {
                filename: part
                    .attachment_name()
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(String::from),
                content_type: content_type_of(part),
                contents: part.contents().to_vec(),
            });
        }

        if let PartType::Message(nested) = &part.body {
            if depth + 1 < MAX_DEPTH {
                collect_attachments(nested, depth + 1, out);
            } else {
                tracing::warn!(depth, "Embedded message nesting too deep, not descending");
            }
        }
    }
}

fn is_attachment(part: &mail_parser::MessagePart<'_>) -> bool {
    part.content_disposition()
        .map(|d| d.ctype().eq_ignore_ascii_case("attachment"))
        .unwrap_or(false)
}

fn content_type_of(part: &mail_parser::MessagePart<'_>) -> String {
    part.content_type()
        .map(|ct| {
            let main = ct.ctype();
            match ct.subtype() {
                Some(sub) => format!("{main}/{sub}"),
                None => main.to_string(),
            }
        })
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// Skip a BOM and a leading `From ` separator line.
///
/// IMAP never sends one, but `.eml` files split out of an mbox keep it, and
/// `mail-parser` would otherwise read the envelope line as a broken header.
fn skip_from_line(data: &[u8]) -> &[u8] {
    let data = data.strip_prefix(&[0xEF, 0xBB, 0xBF]).unwrap_or(data);

    if data.starts_with(b"From ") {
        if let Some(pos) = data.iter().position(|&b| b == b'\n') {
            return &data[pos + 1..];
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn b64(data: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(data)
    }

    fn message_with_parts(parts: &[String]) -> Vec<u8> {
        let mut raw = String::from(
            "From: ci@example.com\r\n\
             To: builds@example.com\r\n\
             Subject: Nightly build\r\n\
             MIME-Version: 1.0\r\n\
             Content-Type: multipart/mixed; boundary=\"XYZ\"\r\n\r\n\
             --XYZ\r\n\
             Content-Type: text/plain\r\n\r\n\
             Build attached.\r\n",
        );
        for part in parts {
            raw.push_str("--XYZ\r\n");
            raw.push_str(part);
        }
        raw.push_str("--XYZ--\r\n");
        raw.into_bytes()
    }

    fn part(disposition: &str, content_type: &str, data: &[u8]) -> String {
        format!(
            "Content-Type: {content_type}\r\n\
             Content-Disposition: {disposition}\r\n\
             Content-Transfer-Encoding: base64\r\n\r\n{}\r\n",
            b64(data)
        )
    }

    #[test]
    fn test_attachment_selected() {
        let raw = message_with_parts(&[part(
            "attachment; filename=\"level1.js\"",
            "application/javascript",
            b"loadLevel(1);",
        )]);
        let atts = extract_attachments(&raw).unwrap();
        assert_eq!(atts.len(), 1);
        assert_eq!(atts[0].filename.as_deref(), Some("level1.js"));
        assert_eq!(atts[0].contents, b"loadLevel(1);");
        assert_eq!(atts[0].content_type, "application/javascript");
    }

    #[test]
    fn test_inline_part_ignored() {
        let raw = message_with_parts(&[part(
            "inline; filename=\"level1.js\"",
            "application/javascript",
            b"loadLevel(1);",
        )]);
        assert!(extract_attachments(&raw).unwrap().is_empty());
    }

    #[test]
    fn test_attachment_without_filename() {
        let raw = message_with_parts(&[part("attachment", "application/octet-stream", b"\x00\x01")]);
        let atts = extract_attachments(&raw).unwrap();
        assert_eq!(atts.len(), 1);
        assert!(atts[0].filename.is_none());
    }

    #[test]
    fn test_nested_multipart() {
        let inner = format!(
            "Content-Type: multipart/mixed; boundary=\"INNER\"\r\n\r\n\
             --INNER\r\n{}--INNER--\r\n",
            part("attachment; filename=\"pack.zip\"", "application/zip", b"PK")
        );
        let raw = message_with_parts(&[inner]);
        let atts = extract_attachments(&raw).unwrap();
        assert_eq!(atts.len(), 1);
        assert_eq!(atts[0].filename.as_deref(), Some("pack.zip"));
    }

    #[test]
    fn test_plain_message_has_no_attachments() {
        let raw = b"From: a@b.com\r\nSubject: Hi\r\n\r\nJust text.\r\n";
        assert!(extract_attachments(raw).unwrap().is_empty());
    }

    #[test]
    fn test_empty_message_is_error() {
        assert!(matches!(
            extract_attachments(b"  \r\n"),
            Err(HarvestError::Mime(_))
        ));
    }

    #[test]
    fn test_skip_from_line() {
        let raw = b"From user@example.com Thu Jan 01\nSubject: Test\n\nBody";
        assert!(skip_from_line(raw).starts_with(b"Subject:"));

        let raw = b"Subject: Test\n\nBody";
        assert_eq!(skip_from_line(raw), raw);
    }
}
