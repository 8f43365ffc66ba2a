//! Scripted stand-in for the network, shared by the unit tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use hickory_proto::op::ResponseCode;
use hickory_proto::rr::RecordType;

use crate::query::{DnsQuery, QueryError};
use crate::transport::{QueryRequest, Resolver};

#[derive(Debug, Clone)]
pub enum Reply {
	Answers(Vec<String>),
	Timeout,
	Refused,
	/// Never returns; the caller's deadline has to cut it off
	Hang,
}

impl Reply {
	pub fn answers(values: &[&str]) -> Self {
		Reply::Answers(values.iter().map(|v| v.to_string()).collect())
	}
}

/// Replies per resolver IP; unknown addresses time out.
#[derive(Debug, Default)]
pub struct Scripted {
	replies: Mutex<HashMap<IpAddr, Reply>>,
	calls: Mutex<Vec<IpAddr>>,
	in_flight: AtomicUsize,
	peak: AtomicUsize,
}

impl Scripted {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn set(&self, ip: &str, reply: Reply) {
		let ip: IpAddr = ip.parse().unwrap();
		self.replies.lock().unwrap().insert(ip, reply);
	}

	/// Every address queried so far, in call order
	pub fn calls(&self) -> Vec<IpAddr> {
		self.calls.lock().unwrap().clone()
	}

	pub fn peak(&self) -> usize {
		self.peak.load(Ordering::SeqCst)
	}
}

impl DnsQuery for Scripted {
	async fn query(
		&self,
		_request: &QueryRequest,
		resolver: &Resolver,
	) -> Result<Vec<String>, QueryError> {
		let ip = resolver.addr.ip();
		let reply = {
			self.calls.lock().unwrap().push(ip);
			self.replies.lock().unwrap().get(&ip).cloned().unwrap_or(Reply::Timeout)
		};

		let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
		self.peak.fetch_max(now, Ordering::SeqCst);
		let delay = match reply {
			Reply::Hang => Duration::from_secs(3600),
			_ => Duration::from_millis(5),
		};
		tokio::time::sleep(delay).await;
		self.in_flight.fetch_sub(1, Ordering::SeqCst);

		match reply {
			Reply::Answers(answers) => Ok(answers),
			Reply::Timeout | Reply::Hang => Err(QueryError::Timeout),
			Reply::Refused => Err(QueryError::Rcode(ResponseCode::Refused)),
		}
	}
}

pub fn resolver(name: &str, ip: &str, region: &str, is_backup: bool) -> Resolver {
	Resolver {
		name: name.to_string(),
		addr: std::net::SocketAddr::new(ip.parse().unwrap(), 53),
		region: region.to_string(),
		is_backup,
	}
}

pub fn request() -> QueryRequest {
	QueryRequest {
		domain: "example.com".to_string(),
		record_type: RecordType::NS,
		timeout: Duration::from_secs(5),
	}
}
