//! Request/response client on one diagnostic address pair
//!
//! KWP2000 and GMLAN share the response conventions this client relies on:
//! positive response SID = request SID + 0x40, negative response
//! `[0x7F, sid, nrc]`, and NRC 0x78 to signal a pending answer.

use std::sync::Arc;
use std::time::Duration;

use super::{NegativeResponseCode, ProtocolError};
use crate::transport::{AddressInfo, CanTransport};

/// Negative response service identifier
pub const NEGATIVE_RESPONSE: u8 = 0x7F;

/// Upper bound on waiting out consecutive "response pending" answers
const RESPONSE_PENDING_TIMEOUT: Duration = Duration::from_secs(30);

/// Diagnostic client bound to one address pair
#[derive(Clone)]
pub struct DiagClient {
    transport: Arc<dyn CanTransport>,
    address: AddressInfo,
    timeout: Duration,
}

impl DiagClient {
    pub fn new(transport: Arc<dyn CanTransport>, address: AddressInfo, timeout: Duration) -> Self {
        Self {
            transport,
            address,
            timeout,
        }
    }

    pub fn address(&self) -> AddressInfo {
        self.address
    }

    pub fn transport(&self) -> &Arc<dyn CanTransport> {
        &self.transport
    }

    /// Send a request and return the raw response, resolving negative responses
    pub async fn send_request(&self, request: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let start = tokio::time::Instant::now();

        loop {
            let response = self
                .transport
                .send_receive(self.address, request, self.timeout)
                .await?;

            // Check for negative response
            if response.first() == Some(&NEGATIVE_RESPONSE) {
                if response.len() < 3 {
                    return Err(ProtocolError::InvalidResponse(
                        "Negative response too short".to_string(),
                    ));
                }

                let service_id = response[1];
                let nrc = NegativeResponseCode::from(response[2]);

                // Handle response pending
                if nrc == NegativeResponseCode::ResponsePending {
                    if start.elapsed() > RESPONSE_PENDING_TIMEOUT {
                        return Err(ProtocolError::Timeout);
                    }
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }

                return Err(ProtocolError::NegativeResponse { service_id, nrc });
            }

            return Ok(response);
        }
    }

    /// Send a request and require a positive response to it
    ///
    /// `echo` is the number of request bytes after the SID the ECU repeats
    /// back (e.g. the identifier of a read). Returns the payload after them.
    pub async fn request_positive(&self, request: &[u8], echo: usize) -> Result<Vec<u8>, ProtocolError> {
        let sid = *request
            .first()
            .ok_or_else(|| ProtocolError::InvalidResponse("Empty request".to_string()))?;
        let response = self.send_request(request).await?;

        let expected = sid.wrapping_add(0x40);
        match response.first() {
            Some(&actual) if actual == expected => {}
            Some(&actual) => return Err(ProtocolError::UnexpectedResponse { expected, actual }),
            None => return Err(ProtocolError::InvalidResponse("Empty response".to_string())),
        }

        let header = 1 + echo;
        if response.len() < header || response[1..header] != request[1..header.min(request.len())] {
            return Err(ProtocolError::InvalidResponse(format!(
                "Response {} does not echo request {}",
                hex::encode_upper(&response),
                hex::encode_upper(request)
            )));
        }

        Ok(response[header..].to_vec())
    }

    /// Send without waiting for any response
    pub async fn send_only(&self, request: &[u8]) -> Result<(), ProtocolError> {
        self.transport.send(self.address, request).await?;
        Ok(())
    }
}
