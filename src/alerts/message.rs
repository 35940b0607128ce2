// =============================================================================
// Outbound Message — envelope for every alert leaving the engine
// =============================================================================
//
// Two renderings of the same envelope:
//   - XML  (`<ArcosMessage><Header>..</Header><Body>..</Body></ArcosMessage>`)
//     written to the outbox for the mail relay; every text node is escaped.
//   - JSON (`{"header": {..}, "body": {..}}`) posted to webhooks.
//
// Message ids are `SIG-nnnnn` for immediate alerts and `RPT-nnnnn` for
// digests.
// =============================================================================

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const SIGNATURE: &str = "ARCOS_v3.5";

/// Escape the characters that are significant in markup.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Immediate panic alert.
    Signal,
    /// Periodic digest.
    Report,
}

impl MessageKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Signal => "SIG",
            Self::Report => "RPT",
        }
    }
}

pub fn new_message_id<R: Rng + ?Sized>(kind: MessageKind, rng: &mut R) -> String {
    format!("{}-{}", kind.prefix(), rng.gen_range(10000..=99999))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub message_id: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageBody {
    #[serde(rename = "ticker")]
    pub symbol: String,
    pub signal: String,
    pub probability: f64,
    #[serde(default)]
    pub win_rate: f64,
    pub uncertainty: f64,
    pub sample_size: u32,
    /// Raw text; escaped only when rendered.
    pub rationale: String,
    pub signature: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub header: MessageHeader,
    pub body: MessageBody,
}

impl OutboundMessage {
    pub fn message_id(&self) -> &str {
        &self.header.message_id
    }

    pub fn is_digest(&self) -> bool {
        self.header.message_id.starts_with(MessageKind::Report.prefix())
    }

    pub fn to_xml(&self) -> String {
        let h = &self.header;
        let b = &self.body;
        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<ArcosMessage>\n");

        // Writing into a String cannot fail.
        let _ = write!(
            xml,
            "    <Header>\n        <MessageID>{}</MessageID>\n        <Sender>{}</Sender>\n        <Timestamp>{}</Timestamp>\n    </Header>\n",
            escape_markup(&h.message_id),
            escape_markup(&h.sender),
            h.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
        let _ = write!(
            xml,
            "    <Body>\n        <Ticker>{}</Ticker>\n        <Signal>{}</Signal>\n        <Probability>{}</Probability>\n        <Uncertainty>{}</Uncertainty>\n        <SampleSize>{}</SampleSize>\n        <Rationale>{}</Rationale>\n        <Signature>{}</Signature>\n",
            escape_markup(&b.symbol),
            escape_markup(&b.signal),
            b.probability,
            b.uncertainty,
            b.sample_size,
            escape_markup(&b.rationale),
            escape_markup(&b.signature),
        );
        if !b.tags.is_empty() {
            xml.push_str("        <Tags>\n");
            for tag in &b.tags {
                let _ = writeln!(xml, "            <Tag>{}</Tag>", escape_markup(tag));
            }
            xml.push_str("        </Tags>\n");
        }
        xml.push_str("    </Body>\n</ArcosMessage>\n");
        xml
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn message(rationale: &str) -> OutboundMessage {
        OutboundMessage {
            header: MessageHeader {
                message_id: "SIG-12345".into(),
                sender: "HUNTER_KILLER_URGENT".into(),
                timestamp: Utc::now(),
            },
            body: MessageBody {
                symbol: "NVDA".into(),
                signal: "URGENT_CRASH".into(),
                probability: 0.42,
                win_rate: 0.0,
                uncertainty: 0.0,
                sample_size: 0,
                rationale: rationale.into(),
                signature: SIGNATURE.into(),
                tags: vec!["panic".into(), "crash".into()],
            },
        }
    }

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape_markup("a < b && c > \"d\""), "a &lt; b &amp;&amp; c &gt; &quot;d&quot;");
        assert_eq!(escape_markup("it's"), "it&#x27;s");
        assert_eq!(escape_markup("plain text"), "plain text");
    }

    #[test]
    fn message_ids_have_prefix_and_five_digits() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let id = new_message_id(MessageKind::Signal, &mut rng);
            let (prefix, digits) = id.split_once('-').unwrap();
            assert_eq!(prefix, "SIG");
            let n: u32 = digits.parse().unwrap();
            assert!((10000..=99999).contains(&n));
        }
        assert!(new_message_id(MessageKind::Report, &mut rng).starts_with("RPT-"));
    }

    #[test]
    fn xml_escapes_every_text_node() {
        let xml = message("IMMEDIATE <VOLATILITY> & \"noise\"").to_xml();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<Rationale>IMMEDIATE &lt;VOLATILITY&gt; &amp; &quot;noise&quot;</Rationale>"));
        assert!(xml.contains("<Signal>URGENT_CRASH</Signal>"));
        assert!(xml.contains("<Tag>crash</Tag>"));
        assert!(xml.trim_end().ends_with("</ArcosMessage>"));
    }

    #[test]
    fn json_uses_consumer_field_names() {
        let msg = message("x");
        let v: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(v["header"]["message_id"], "SIG-12345");
        assert_eq!(v["body"]["ticker"], "NVDA");
        assert_eq!(v["body"]["tags"][1], "crash");

        let back: OutboundMessage = serde_json::from_value(v).unwrap();
        assert_eq!(back, msg);
        assert!(!back.is_digest());
    }
}
