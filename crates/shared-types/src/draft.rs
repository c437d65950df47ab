use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

const REPLY_PREFIX: &str = "Re: ";

/// Reply draft to be stored in the mailbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub thread_id: Option<String>,
    /// Value for both `In-Reply-To` and `References`
    pub in_reply_to: Option<String>,
}

impl DraftEmail {
    /// Build a reply to `sender`, threading it onto the original message.
    pub fn reply(
        body: &str,
        sender: &str,
        subject: &str,
        thread_id: &str,
        original_message_id: &str,
    ) -> Self {
        let subject = subject.trim();
        let subject = if subject.starts_with(REPLY_PREFIX) {
            subject.to_string()
        } else {
            format!("{}{}", REPLY_PREFIX, subject)
        };

        let original_message_id = original_message_id.trim();
        let in_reply_to = if original_message_id.is_empty() {
            None
        } else {
            Some(format!("<{}@mail.gmail.com>", original_message_id))
        };

        let thread_id = thread_id.trim();

        Self {
            to: reply_address(sender),
            subject,
            body: body.to_string(),
            thread_id: (!thread_id.is_empty()).then(|| thread_id.to_string()),
            in_reply_to,
        }
    }

    /// Render as an RFC 822 message with a base64 `text/plain` body.
    pub fn to_rfc822(&self) -> String {
        let mut out = String::new();
        out.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
        out.push_str("MIME-Version: 1.0\r\n");
        out.push_str("Content-Transfer-Encoding: base64\r\n");
        out.push_str(&format!("to: {}\r\n", single_line(&self.to)));
        out.push_str(&format!(
            "subject: {}\r\n",
            encode_header(&single_line(&self.subject))
        ));
        if let Some(reference) = &self.in_reply_to {
            let reference = single_line(reference);
            out.push_str(&format!("In-Reply-To: {}\r\n", reference));
            out.push_str(&format!("References: {}\r\n", reference));
        }
        out.push_str("\r\n");

        let encoded = STANDARD.encode(self.body.as_bytes());
        let bytes = encoded.as_bytes();
        for line in bytes.chunks(76) {
            out.push_str(&String::from_utf8_lossy(line));
            out.push_str("\r\n");
        }
        out
    }
}

/// Extract the bare address from a header like `"Jane Doe" <jane@example.com>`
pub fn reply_address(sender: &str) -> String {
    let sender = sender.trim();
    if let (Some(open), Some(close)) = (sender.rfind('<'), sender.rfind('>')) {
        if open < close {
            return sender[open + 1..close].trim().to_string();
        }
    }
    sender.to_string()
}

/// Collapse line breaks so a header value cannot start a new header
fn single_line(value: &str) -> String {
    value
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?utf-8?b?{}?=", STANDARD.encode(value.as_bytes()))
    }
}
