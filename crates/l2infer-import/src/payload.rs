//! Payload stripper: heuristically recognises an encapsulated well-known
//! upper-layer protocol trailing a message and moves it out of
//! `Message::data` into `Message::payload_data`/`payload_summary`, so the
//! inference core never has to see bytes it has no hope of explaining.
//!
//! Two-phase, mirroring `original_source/src/PayloadFinder.py`: derive
//! offset *candidates* from the sizes of the smallest 20% of messages (the
//! assumption being that short messages carry no payload), then test those
//! offsets against a bounded sample of messages, falling back to a
//! brute-force byte-by-byte scan when none of the candidates parse.

use l2infer_model::Message;

const SMALL_MESSAGE_FRACTION: f64 = 0.2;

#[derive(Debug, Clone)]
pub struct PayloadStripperConfig {
    /// Matches `msgsToTest` in `PayloadFinder._testOffsets`: caps how many
    /// messages are probed, since the brute-force fallback is O(length).
    pub sample_size: usize,
    /// `--no-tunnel`: skip the Ethernet-encapsulation search, for traces of
    /// a layer-2 protocol that itself replaces Ethernet rather than tunnels
    /// it.
    pub omit_ethernet: bool,
}

impl Default for PayloadStripperConfig {
    fn default() -> Self {
        Self {
            sample_size: 50,
            omit_ethernet: false,
        }
    }
}

/// Strips recognised payloads from up to `config.sample_size` messages,
/// leaving the rest (and any message with no recognised offset) untouched.
pub fn strip_payloads(messages: Vec<Message>, config: &PayloadStripperConfig) -> Vec<Message> {
    if messages.len() < 5 {
        return messages;
    }

    let mut lengths: Vec<usize> = messages.iter().map(|m| m.data.len()).collect();
    lengths.sort_unstable();
    let small_count = (((messages.len() as f64) * SMALL_MESSAGE_FRACTION).round() as usize).max(1);
    let mut candidates: Vec<usize> = lengths[..small_count.min(lengths.len())].to_vec();
    candidates.sort_unstable();
    candidates.dedup();

    let sample = messages.len().min(config.sample_size);
    let mut tested = 0usize;

    messages
        .into_iter()
        .map(|message| {
            if tested >= sample {
                return message;
            }
            tested += 1;
            try_strip_one(message, &candidates, config.omit_ethernet)
        })
        .collect()
}

fn try_strip_one(message: Message, candidates: &[usize], omit_ethernet: bool) -> Message {
    for &offset in candidates {
        if offset == 0 || offset >= message.data.len() {
            continue;
        }
        if let Some(summary) = recognise(&message.data[offset..], omit_ethernet) {
            return split_at(message, offset, summary);
        }
    }
    // Brute-force fallback: byte-by-byte, skipping offsets already tried.
    for offset in 1..message.data.len() {
        if candidates.contains(&offset) {
            continue;
        }
        if let Some(summary) = recognise(&message.data[offset..], omit_ethernet) {
            return split_at(message, offset, summary);
        }
    }
    message
}

fn split_at(mut message: Message, offset: usize, summary: String) -> Message {
    let payload = message.data.split_off(offset);
    message.payload_data = Some(payload);
    message.payload_summary = Some(summary);
    message
}

/// Tries to parse `data` as Ethernet-encapsulated or bare IP traffic,
/// returning a short human-readable summary (e.g. `"IPv4/UDP:53"`) on the
/// first recognised layering.
fn recognise(data: &[u8], omit_ethernet: bool) -> Option<String> {
    if !omit_ethernet {
        if let Ok(parsed) = etherparse::SlicedPacket::from_ethernet(data) {
            if parsed.net.is_some() {
                return Some(summarise(&parsed));
            }
        }
    }
    if let Ok(parsed) = etherparse::SlicedPacket::from_ip(data) {
        if parsed.net.is_some() {
            return Some(summarise(&parsed));
        }
    }
    None
}

fn summarise(parsed: &etherparse::SlicedPacket) -> String {
    use etherparse::{NetSlice, TransportSlice};

    let net = match &parsed.net {
        Some(NetSlice::Ipv4(_)) => "IPv4",
        Some(NetSlice::Ipv6(_)) => "IPv6",
        _ => "IP",
    };
    let transport = match &parsed.transport {
        Some(TransportSlice::Tcp(tcp)) => format!("TCP:{}", tcp.destination_port()),
        Some(TransportSlice::Udp(udp)) => format!("UDP:{}", udp.destination_port()),
        _ => "?".to_string(),
    };
    format!("{net}/{transport}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(bytes: Vec<u8>) -> Message {
        Message::new(bytes, 0)
    }

    #[test]
    fn leaves_messages_untouched_when_corpus_is_too_small() {
        let messages = vec![msg(vec![1, 2, 3]), msg(vec![4, 5, 6])];
        let stripped = strip_payloads(messages, &PayloadStripperConfig::default());
        assert!(stripped.iter().all(|m| m.payload_data.is_none()));
    }

    #[test]
    fn non_protocol_bytes_are_left_unstripped() {
        let messages: Vec<Message> = (0..20u8)
            .map(|i| msg(vec![0xAA, 0xBB, i, i.wrapping_add(1), i.wrapping_add(2)]))
            .collect();
        let stripped = strip_payloads(messages, &PayloadStripperConfig::default());
        assert!(stripped.iter().all(|m| m.payload_data.is_none()));
    }
}
