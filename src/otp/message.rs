//! Composition of the subject and body pushed to a channel.

use super::OtpRecord;

/// Values substituted into a [`MessageTemplate`].
#[derive(Debug, Clone)]
pub struct MessageContext<'a> {
    pub to: &'a str,
    pub namespace: &'a str,
    /// Human-readable channel name.
    pub channel: &'a str,
    pub otp: &'a str,
    /// One-click verification URL carrying the passcode.
    pub otp_url: &'a str,
}

impl<'a> MessageContext<'a> {
    pub fn new(record: &'a OtpRecord, channel_name: &'a str, otp_url: &'a str) -> Self {
        Self {
            to: &record.recipient,
            namespace: &record.namespace,
            channel: channel_name,
            otp: &record.passcode,
            otp_url,
        }
    }
}

/// Subject and body templates for one channel.
///
/// Placeholders `{to}`, `{namespace}`, `{channel}`, `{otp}` and `{otp_url}`
/// are replaced verbatim; anything else is left as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    subject: String,
    body: String,
}

impl MessageTemplate {
    pub fn new<S: Into<String>, B: Into<String>>(subject: S, body: B) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }

    /// Renders the template, returning `(subject, body)`.
    pub fn render(&self, ctx: &MessageContext<'_>) -> (String, String) {
        (expand(&self.subject, ctx), expand(&self.body, ctx))
    }
}

impl Default for MessageTemplate {
    fn default() -> Self {
        Self::new(
            "{channel} verification",
            "Your verification code is {otp}. You can also verify at {otp_url}",
        )
    }
}

fn expand(template: &str, ctx: &MessageContext<'_>) -> String {
    let mut out = String::with_capacity(template.len() + ctx.otp_url.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };

        let value = match &tail[1..end] {
            "to" => Some(ctx.to),
            "namespace" => Some(ctx.namespace),
            "channel" => Some(ctx.channel),
            "otp" => Some(ctx.otp),
            "otp_url" => Some(ctx.otp_url),
            _ => None,
        };
        match value {
            Some(v) => {
                out.push_str(v);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }

    out.push_str(rest);
    out
}
