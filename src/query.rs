use std::future::Future;
use std::process::Output;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::ResponseCode;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::dns::{build_query, parse_response, DnsResponse};
use crate::transport::{QueryRequest, QueryResult, Resolver};

/// Extra time granted on top of the per-query timeout before a query is abandoned
const QUERY_GRACE: Duration = Duration::from_secs(1);

/// Stray or garbled datagrams tolerated before giving up on a UDP query
const MAX_RECV_ATTEMPTS: usize = 3;

/// Why a single resolver query produced no usable reply
#[derive(Debug, Error)]
pub enum QueryError {
	#[error("timeout")]
	Timeout,
	#[error("network error: {0}")]
	Io(#[from] std::io::Error),
	#[error("invalid query: {0}")]
	InvalidQuery(String),
	#[error("malformed response: {0}")]
	Malformed(String),
	#[error("resolver answered {0}")]
	Rcode(ResponseCode),
	#[error("{0}")]
	Tool(String),
}

/// A mechanism that can ask one resolver one question.
pub trait DnsQuery: Send + Sync + 'static {
	fn query(
		&self,
		request: &QueryRequest,
		resolver: &Resolver,
	) -> impl Future<Output = Result<Vec<String>, QueryError>> + Send;
}

/// Query one resolver, folding every failure into the returned result.
///
/// The whole call is bounded by the request timeout plus a small grace
/// period, whatever the backend does.
pub async fn execute<Q: DnsQuery>(
	executor: &Q,
	request: &QueryRequest,
	resolver: Resolver,
) -> QueryResult {
	let deadline = request.timeout + QUERY_GRACE;
	let outcome = match tokio::time::timeout(deadline, executor.query(request, &resolver)).await {
		Ok(outcome) => outcome,
		Err(_) => Err(QueryError::Timeout),
	};
	match outcome {
		Ok(answers) => QueryResult::answered(resolver, answers),
		Err(e) => {
			debug!(resolver = %resolver.name, addr = %resolver.addr, "query failed: {}", e);
			QueryResult::failed(resolver, e.to_string())
		}
	}
}

/// Query every resolver concurrently, at most `worker_cap` at a time.
///
/// Returns one result per resolver in completion order. Dropping the
/// returned future aborts queries still in flight.
pub async fn fan_out<Q: DnsQuery>(
	executor: &Arc<Q>,
	resolvers: &[Resolver],
	request: &QueryRequest,
	worker_cap: usize,
) -> Vec<QueryResult> {
	if resolvers.is_empty() {
		return Vec::new();
	}
	let workers = worker_cap.clamp(1, resolvers.len());
	let semaphore = Arc::new(Semaphore::new(workers));
	let mut tasks = JoinSet::new();

	for resolver in resolvers {
		let sem = semaphore.clone();
		let executor = executor.clone();
		let request = request.clone();
		let resolver = resolver.clone();

		tasks.spawn(async move {
			let _permit = match sem.acquire_owned().await {
				Ok(permit) => permit,
				Err(_) => return QueryResult::failed(resolver, "worker pool closed"),
			};
			execute(executor.as_ref(), &request, resolver).await
		});
	}

	let mut results = Vec::with_capacity(resolvers.len());
	while let Some(joined) = tasks.join_next().await {
		match joined {
			Ok(result) => results.push(result),
			Err(e) => warn!("query task failed: {}", e),
		}
	}
	results
}

/// Queries resolvers directly over UDP.
///
/// Each query binds its own socket so concurrent tasks never read each
/// other's replies.
#[derive(Debug, Clone, Default)]
pub struct UdpQuery;

impl UdpQuery {
	pub async fn ensure_available(&self) -> Result<(), QueryError> {
		UdpSocket::bind("0.0.0.0:0").await?;
		Ok(())
	}
}

impl DnsQuery for UdpQuery {
	async fn query(
		&self,
		request: &QueryRequest,
		resolver: &Resolver,
	) -> Result<Vec<String>, QueryError> {
		let txid: u16 = rand::random();
		let query_bytes = build_query(&request.domain, request.record_type, txid)
			.map_err(|e| QueryError::InvalidQuery(e.to_string()))?;

		let bind_addr = if resolver.addr.is_ipv4() {
			"0.0.0.0:0"
		} else {
			"[::]:0"
		};
		let socket = UdpSocket::bind(bind_addr).await?;

		let start = Instant::now();
		socket.send_to(&query_bytes, resolver.addr).await?;

		// Use 4096-byte buffer to handle EDNS-extended responses
		let mut buf = vec![0u8; 4096];
		let mut last_error = None;
		for _ in 0..MAX_RECV_ATTEMPTS {
			let remaining = request.timeout
				.checked_sub(start.elapsed())
				.ok_or(QueryError::Timeout)?;
			let (len, src) = tokio::time::timeout(remaining, socket.recv_from(&mut buf))
				.await
				.map_err(|_| QueryError::Timeout)??;
			if src.ip() != resolver.addr.ip() {
				continue;
			}
			match parse_response(&buf[..len], txid) {
				Ok(response) => return answers_from(response),
				Err(e) => last_error = Some(e.to_string()),
			}
		}

		Err(QueryError::Malformed(
			last_error.unwrap_or_else(|| "no matching reply".to_string()),
		))
	}
}

/// NOERROR and NXDOMAIN mean the resolver answered; anything else is a failure.
fn answers_from(response: DnsResponse) -> Result<Vec<String>, QueryError> {
	if response.truncated {
		return Err(QueryError::Malformed("truncated response".to_string()));
	}
	match response.rcode {
		ResponseCode::NoError | ResponseCode::NXDomain => Ok(response.answers),
		rcode => Err(QueryError::Rcode(rcode)),
	}
}

/// Queries resolvers by running the `dig` command-line tool.
#[derive(Debug, Clone)]
pub struct DigQuery {
	program: String,
}

impl Default for DigQuery {
	fn default() -> Self {
		DigQuery { program: "dig".to_string() }
	}
}

/// dig's exit status when no reply arrived from the server
const DIG_NO_REPLY: i32 = 9;

impl DigQuery {
	pub async fn ensure_available(&self) -> Result<(), QueryError> {
		Command::new(&self.program)
			.arg("-v")
			.output()
			.await
			.map(|_| ())
			.map_err(|e| QueryError::Tool(format!(
				"the '{}' command is not installed or not found in PATH ({})",
				self.program, e,
			)))
	}

	fn args(request: &QueryRequest, resolver: &Resolver) -> Vec<String> {
		let mut args = vec![
			format!("@{}", resolver.addr.ip()),
			request.domain.clone(),
			request.record_type.to_string(),
			"+short".to_string(),
			format!("+time={}", request.timeout.as_secs().max(1)),
			"+tries=1".to_string(),
		];
		if resolver.addr.port() != 53 {
			args.push("-p".to_string());
			args.push(resolver.addr.port().to_string());
		}
		args
	}
}

impl DnsQuery for DigQuery {
	async fn query(
		&self,
		request: &QueryRequest,
		resolver: &Resolver,
	) -> Result<Vec<String>, QueryError> {
		let mut command = Command::new(&self.program);
		command.args(Self::args(request, resolver)).kill_on_drop(true);

		let output = tokio::time::timeout(request.timeout + QUERY_GRACE, command.output())
			.await
			.map_err(|_| QueryError::Timeout)??;
		dig_answers(&output)
	}
}

fn dig_answers(output: &Output) -> Result<Vec<String>, QueryError> {
	let stdout = String::from_utf8_lossy(&output.stdout);
	match output.status.code() {
		Some(0) => Ok(stdout.lines()
			.map(str::trim)
			.filter(|line| !line.is_empty() && !line.starts_with(";;"))
			.map(String::from)
			.collect()),
		Some(DIG_NO_REPLY) => Err(QueryError::Timeout),
		code => {
			let stderr = String::from_utf8_lossy(&output.stderr);
			let detail = [stderr.trim(), stdout.trim()].into_iter()
				.find(|s| !s.is_empty())
				.map(String::from);
			Err(QueryError::Tool(detail.unwrap_or_else(|| match code {
				Some(code) => format!("dig exited with status {}", code),
				None => "dig was terminated by a signal".to_string(),
			})))
		}
	}
}

/// The query mechanism selected on the command line
#[derive(Debug, Clone)]
pub enum Backend {
	Udp(UdpQuery),
	Dig(DigQuery),
}

impl Backend {
	/// Fails when the mechanism cannot be used at all on this host.
	pub async fn ensure_available(&self) -> Result<(), QueryError> {
		match self {
			Backend::Udp(q) => q.ensure_available().await,
			Backend::Dig(q) => q.ensure_available().await,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			Backend::Udp(_) => "udp",
			Backend::Dig(_) => "dig",
		}
	}
}

impl DnsQuery for Backend {
	async fn query(
		&self,
		request: &QueryRequest,
		resolver: &Resolver,
	) -> Result<Vec<String>, QueryError> {
		match self {
			Backend::Udp(q) => q.query(request, resolver).await,
			Backend::Dig(q) => q.query(request, resolver).await,
		}
	}
}
