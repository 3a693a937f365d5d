use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use tokio::io::AsyncReadExt as _;
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Reachability check against the monitored dependency.
///
/// A probe answers `true` when the dependency is reachable. Errors are not surfaced:
/// any failure to reach the dependency is simply `false`.
pub trait Probe: Send + 'static {
    fn probe(&mut self) -> impl Future<Output = bool> + Send;
}

/// Opens a TCP connection to `address` and, optionally, waits for the first byte of the
/// server greeting (database servers such as MySQL speak first).
#[derive(Debug, Clone)]
pub struct TcpProbe {
    address: String,
    timeout: Duration,
    expect_greeting: bool,
}

impl TcpProbe {
    #[must_use]
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
            expect_greeting: false,
        }
    }

    /// Like [`TcpProbe::new`], but rejects anything that is not `host:port` and a zero
    /// timeout.
    pub fn checked(address: impl Into<String>, timeout: Duration) -> Result<Self> {
        let address = address.into();
        let valid = address.rsplit_once(':').is_some_and(|(host, port)| {
            !host.is_empty() && port.parse::<u16>().is_ok_and(|p| p != 0)
        });
        if !valid {
            return Err(Error::InvalidDependencyAddress(address));
        }
        if timeout.is_zero() {
            return Err(Error::InvalidDuration("probeTimeout"));
        }
        Ok(Self::new(address, timeout))
    }

    #[must_use]
    pub fn expect_greeting(mut self, expect: bool) -> Self {
        self.expect_greeting = expect;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub async fn check(&self) -> std::io::Result<()> {
        let attempt = async {
            let mut stream = TcpStream::connect(&self.address).await?;
            if self.expect_greeting {
                let mut buf = [0u8; 1];
                if stream.read(&mut buf).await? == 0 {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "connection closed before greeting",
                    ));
                }
            }
            Ok(())
        };

        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(res) => res,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("probe timed out after {:?}", self.timeout),
            )),
        }
    }
}

impl Probe for TcpProbe {
    async fn probe(&mut self) -> bool {
        match self.check().await {
            Ok(()) => true,
            Err(err) => {
                tracing::trace!(address = %self.address, error = %err, "probe failed");
                false
            }
        }
    }
}

/// Replays a fixed sequence of answers, then keeps repeating the last one.
///
/// Used for rehearsals without a real dependency and for deterministic tests.
#[derive(Debug, Clone)]
pub struct ScriptedProbe {
    script: VecDeque<bool>,
    last: bool,
}

impl ScriptedProbe {
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: script.into_iter().collect(),
            last: true,
        }
    }

    /// A probe that always answers `connected`.
    #[must_use]
    pub fn constant(connected: bool) -> Self {
        Self {
            script: VecDeque::new(),
            last: connected,
        }
    }
}

impl Probe for ScriptedProbe {
    async fn probe(&mut self) -> bool {
        if let Some(next) = self.script.pop_front() {
            self.last = next;
        }
        self.last
    }
}
