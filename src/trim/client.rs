use super::{TrimActuator, TrimError};
use crate::protocol::{
    decode_position_response, encode_get_position, encode_set_trim, AxisId, GetPositionRequest,
    SetTrimRequest,
};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const RECV_BUFFER_LEN: usize = 8192;

#[derive(Clone, Debug)]
pub struct TrimSettings {
    pub remote: SocketAddr,
    pub read_timeout: Duration,
    pub multicast_ttl: u32,
}

impl Default for TrimSettings {
    fn default() -> Self {
        Self {
            remote: SocketAddr::from((Ipv4Addr::LOCALHOST, 15090)),
            read_timeout: Duration::from_secs(8),
            multicast_ttl: 5,
        }
    }
}

// Everything behind the lock: holding it is what makes send+receive one unit.
struct ExchangeState {
    socket: UdpSocket,
    offsets: HashMap<AxisId, f32>,
}

/// UDP client for the device's trim commands
///
/// Every request is followed by a receive before the lock is released, even
/// when the reply is not needed. Anything still queued from an exchange that
/// timed out is discarded before the next send, and only datagrams from the
/// device's address count as its reply.
pub struct TrimClient {
    remote: SocketAddr,
    read_timeout: Duration,
    state: Mutex<ExchangeState>,
}

impl TrimClient {
    pub fn connect(settings: TrimSettings) -> Result<Self, TrimError> {
        info!(
            "Opening trim channel to {} (timeout {:?})",
            settings.remote, settings.read_timeout
        );

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_multicast_ttl_v4(settings.multicast_ttl)?;
        socket.set_read_timeout(Some(settings.read_timeout))?;
        debug!("Trim socket bound to {:?}", socket.local_addr());

        Ok(Self {
            remote: settings.remote,
            read_timeout: settings.read_timeout,
            state: Mutex::new(ExchangeState {
                socket,
                offsets: HashMap::new(),
            }),
        })
    }

    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    fn lock(&self) -> MutexGuard<'_, ExchangeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drops datagrams that arrived after an earlier exchange gave up, so a
    /// late reply is never read as the answer to the next request.
    fn drain_stale(&self, socket: &UdpSocket) -> Result<(), TrimError> {
        socket.set_nonblocking(true)?;
        let mut buffer = [0u8; RECV_BUFFER_LEN];
        let outcome = loop {
            match socket.recv_from(&mut buffer) {
                Ok((len, from)) => debug!("Discarding stale {} byte datagram from {}", len, from),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                // ICMP port unreachable from an earlier send surfaces here on some platforms
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {}
                Err(e) => break Err(TrimError::Io(e)),
            }
        };
        socket.set_nonblocking(false)?;
        outcome
    }

    fn accepts_reply_from(&self, from: SocketAddr) -> bool {
        // A multicast group is never the source of a reply.
        from == self.remote || self.remote.ip().is_multicast()
    }

    fn exchange(&self, state: &ExchangeState, request: &[u8]) -> Result<Vec<u8>, TrimError> {
        self.drain_stale(&state.socket)?;
        state.socket.send_to(request, self.remote)?;

        let deadline = Instant::now() + self.read_timeout;
        let mut buffer = [0u8; RECV_BUFFER_LEN];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(self.timed_out());
            }
            state.socket.set_read_timeout(Some(remaining))?;
            match state.socket.recv_from(&mut buffer) {
                Ok((len, from)) if self.accepts_reply_from(from) => {
                    debug!("Received {} byte reply from {}", len, from);
                    return Ok(buffer[..len].to_vec());
                }
                Ok((len, from)) => {
                    debug!("Ignoring {} byte datagram from unexpected sender {}", len, from);
                }
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(self.timed_out());
                }
                Err(e) => return Err(TrimError::Io(e)),
            }
        }
    }

    fn timed_out(&self) -> TrimError {
        warn!("Device at {} did not answer in {:?}", self.remote, self.read_timeout);
        TrimError::Timeout {
            after: self.read_timeout,
        }
    }

    fn read_position_locked(&self, state: &ExchangeState, axis: AxisId) -> Result<f32, TrimError> {
        let reply = self.exchange(state, &encode_get_position(GetPositionRequest { axis }))?;
        let response = decode_position_response(&reply)?;
        debug!(
            "Position of {}: {} (status {}, node {})",
            axis, response.position, response.status, response.node_id
        );
        Ok(response.position)
    }

    fn apply_locked(&self, state: &ExchangeState, axis: AxisId, trim: f32) -> Result<(), TrimError> {
        // Reply content is irrelevant but it must be drained.
        let _reply = self.exchange(state, &encode_set_trim(SetTrimRequest { axis, trim }))?;
        debug!("Applied trim {} to {}", trim, axis);
        Ok(())
    }
}

impl TrimActuator for TrimClient {
    fn read_axis_position(&self, axis: AxisId) -> Result<f32, TrimError> {
        let state = self.lock();
        self.read_position_locked(&state, axis)
    }

    fn apply_trim(&self, axis: AxisId, value: f32) -> Result<(), TrimError> {
        let state = self.lock();
        self.apply_locked(&state, axis, value)
    }

    fn set_trim_to_current_position(&self, axis: AxisId) -> Result<f32, TrimError> {
        let mut state = self.lock();
        let position = self.read_position_locked(&state, axis)?;
        state.offsets.insert(axis, position);
        self.apply_locked(&state, axis, position)?;
        Ok(position)
    }

    fn release_trim(&self, axis: AxisId) -> Result<(), TrimError> {
        let mut state = self.lock();
        state.offsets.insert(axis, 0.0);
        self.apply_locked(&state, axis, 0.0)
    }

    fn nudge_trim(&self, axis: AxisId, delta: f32) -> Result<f32, TrimError> {
        let mut state = self.lock();
        let offset = state.offsets.entry(axis).or_insert(0.0);
        *offset += delta;
        let offset = *offset;
        self.apply_locked(&state, axis, offset)?;
        Ok(offset)
    }

    fn current_trim_offset(&self, axis: AxisId) -> f32 {
        self.lock().offsets.get(&axis).copied().unwrap_or(0.0)
    }
}
