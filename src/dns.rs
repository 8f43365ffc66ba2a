use anyhow::{anyhow, Result};
use hickory_proto::op::{Edns, Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::{Name, RecordType};

/// Advertised EDNS UDP payload size, large enough for typical NS sets
const EDNS_PAYLOAD: u16 = 1232;

/// DNS response information extracted from a parsed message
#[derive(Debug)]
pub struct DnsResponse {
	pub rcode: ResponseCode,
	pub truncated: bool,
	/// Answer section rdata rendered as text, in wire order
	pub answers: Vec<String>,
}

/// Build a recursive DNS query message for the given domain and record type.
///
/// Returns the serialized query bytes ready to send over UDP.
pub fn build_query(domain: &str, record_type: RecordType, txid: u16) -> Result<Vec<u8>> {
	let name = Name::from_ascii(domain)
		.map_err(|e| anyhow!("invalid domain name '{}': {}", domain, e))?;

	let mut message = Message::new();
	message.set_id(txid);
	message.set_recursion_desired(true);
	message.add_query(Query::query(name, record_type));

	let edns = message.extensions_mut().get_or_insert_with(Edns::new);
	edns.set_max_payload(EDNS_PAYLOAD);

	let bytes = message.to_vec()
		.map_err(|e| anyhow!("failed to serialize DNS query: {}", e))?;
	Ok(bytes)
}

/// Parse a DNS response, validating the transaction ID and collecting answers.
///
/// Returns an error if the response cannot be parsed or the txid does not match.
pub fn parse_response(bytes: &[u8], expected_txid: u16) -> Result<DnsResponse> {
	let message = Message::from_vec(bytes)
		.map_err(|e| anyhow!("failed to parse DNS response: {}", e))?;

	if message.id() != expected_txid {
		return Err(anyhow!(
			"txid mismatch: expected {}, got {}",
			expected_txid, message.id()
		));
	}

	if message.message_type() != MessageType::Response {
		return Err(anyhow!("received a query instead of a response"));
	}

	// Same shape as `dig +short`: every answer record, CNAMEs included
	let answers = message.answers().iter()
		.map(|record| record.data().to_string())
		.collect();

	Ok(DnsResponse {
		rcode: message.response_code(),
		truncated: message.truncated(),
		answers,
	})
}
