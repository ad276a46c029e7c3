//! One network session between the appliance and a remote peer
//!
//! The session owns the flash mirror, the receive staging buffer, the
//! write queue with its lock state and the trace decoder state. Nothing
//! else may touch them while the session lives.

use std::sync::atomic::{AtomicBool, Ordering};

use rem100_core::bridge::memory_map::{
    control_word, magic, AVAILABLE_COUNT_OFFSET, DATA_AVAILABLE_OFFSET, LOCK_OFFSET,
    MESSAGE_WINDOW_OFFSET, SIGNALING_END,
};
use rem100_core::bridge::{
    region_of, FlashLockState, PendingWriteRequest, Region, WriteApplier, WriteQueue,
};
use rem100_core::device::{CommandTransport, Emulator};
use rem100_core::trace::{BusEvent, DecoderState};

use crate::error::{BridgeError, Result};
use crate::link::PeerLink;

/// Capacity of the receive staging buffer
pub const STAGING_BUFFER_SIZE: usize = 256;

/// Smallest flash image that covers the signaling region
pub const MIN_IMAGE_SIZE: usize = SIGNALING_END as usize;

/// Fail unless `image` covers the signaling region
pub fn check_image(image: &[u8]) -> Result<()> {
    if image.len() < MIN_IMAGE_SIZE {
        return Err(BridgeError::ImageTooSmall {
            size: image.len(),
            required: MIN_IMAGE_SIZE,
        });
    }
    Ok(())
}

/// Applies intercepted writes to the appliance, the mirror and the peer
struct BridgePort<'a, T: CommandTransport, L: PeerLink> {
    device: &'a mut Emulator<T>,
    link: L,
    mirror: Vec<u8>,
    staging: heapless::Vec<u8, STAGING_BUFFER_SIZE>,
    new_data: bool,
}

impl<T: CommandTransport, L: PeerLink> BridgePort<'_, T, L> {
    fn write_mirror(&mut self, offset: u32, data: &[u8]) -> bool {
        let start = offset as usize;
        let end = start.saturating_add(data.len());
        match self.mirror.get_mut(start..end) {
            Some(dst) => {
                dst.copy_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// The master consumed `count` bytes of the message window
    fn acknowledge(&mut self, data: &[u8]) -> Result<()> {
        let count = control_word(data).ok_or_else(|| {
            BridgeError::Protocol(format!(
                "acknowledgement of {} bytes, expected a 4 byte count",
                data.len()
            ))
        })? as usize;

        let staged = self.staging.len();
        if count > staged {
            return Err(BridgeError::Protocol(format!(
                "master acknowledged {} bytes but only {} were staged",
                count, staged
            )));
        }

        log::info!("SPI Master read {} bytes", count);
        self.staging.copy_within(count.., 0);
        self.staging.truncate(staged - count);

        if self.staging.is_empty() {
            self.device
                .write_block(DATA_AVAILABLE_OFFSET, &0u32.to_le_bytes())?;
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<usize> {
        let room = self.staging.capacity() - self.staging.len();
        if room == 0 {
            return Ok(0);
        }

        let mut buf = [0u8; STAGING_BUFFER_SIZE];
        let n = self.link.poll_recv(&mut buf[..room])?;
        if n == 0 {
            return Ok(0);
        }

        let was_empty = self.staging.is_empty();
        self.staging
            .extend_from_slice(&buf[..n])
            .map_err(|_| BridgeError::OutOfMemory)?;
        if was_empty {
            self.new_data = true;
        }
        log::debug!("Received {} bytes from peer", n);
        Ok(n)
    }
}

impl<T: CommandTransport, L: PeerLink> WriteApplier for BridgePort<'_, T, L> {
    type Error = BridgeError;

    fn pause(&mut self) -> Result<()> {
        Ok(self.device.pause_emulation()?)
    }

    fn resume(&mut self) -> Result<()> {
        Ok(self.device.resume_emulation()?)
    }

    fn apply(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        match region_of(offset) {
            Region::LockWord => {
                self.write_mirror(offset, data);
                self.device.write_block(offset, data)?;
            }
            Region::MessageWindow => {
                log::debug!("Forwarding {} bytes to peer", data.len());
                self.link.send(data)?;
            }
            Region::AvailableCount => self.acknowledge(data)?,
            Region::DataAvailable => {
                log::debug!("Ignoring master write to data-available flag");
            }
            Region::Flash => {
                if !self.write_mirror(offset, data) {
                    log::warn!(
                        "Write of {} bytes at {:#x} lies outside the {} byte image, writing raw",
                        data.len(),
                        offset,
                        self.mirror.len()
                    );
                    if let Err(e) = self.device.write_block(offset, data) {
                        log::warn!("Raw write at {:#x} failed: {}", offset, e);
                    }
                }
            }
        }
        Ok(())
    }

    fn lock_granted(&mut self) -> Result<()> {
        let count = self.staging.len() as u32;
        self.device
            .write_block(AVAILABLE_COUNT_OFFSET, &count.to_le_bytes())?;
        if !self.staging.is_empty() {
            self.device.write_block(MESSAGE_WINDOW_OFFSET, &self.staging)?;
        }
        Ok(())
    }

    fn has_announcement(&self) -> bool {
        self.new_data
    }

    fn announce(&mut self) -> Result<()> {
        log::debug!("Announcing {} new bytes to the master", self.staging.len());
        self.device
            .write_block(DATA_AVAILABLE_OFFSET, &magic::AVAILABLE.to_le_bytes())?;
        self.new_data = false;
        Ok(())
    }
}

/// Relay state for one connected peer
pub struct NetworkSession<'a, T: CommandTransport, L: PeerLink> {
    port: BridgePort<'a, T, L>,
    queue: WriteQueue,
    lock: FlashLockState,
    decoder: DecoderState,
}

impl<'a, T: CommandTransport, L: PeerLink> NetworkSession<'a, T, L> {
    /// Create a session around a mirror of the emulated flash image
    pub fn new(device: &'a mut Emulator<T>, link: L, mirror: Vec<u8>) -> Result<Self> {
        check_image(&mirror)?;
        Ok(Self {
            port: BridgePort {
                device,
                link,
                mirror,
                staging: heapless::Vec::new(),
                new_data: false,
            },
            queue: WriteQueue::new(),
            lock: FlashLockState::Unlocked,
            decoder: DecoderState::new(),
        })
    }

    /// Publish the unlocked state to the master
    pub fn start(&mut self) -> Result<()> {
        let unlocked = magic::UNLOCKED.to_le_bytes();
        self.port.write_mirror(LOCK_OFFSET, &unlocked);
        self.port.pause()?;
        let written = self.port.device.write_block(LOCK_OFFSET, &unlocked);
        let resumed = self.port.resume();
        written?;
        resumed
    }

    /// Run one iteration: trace, drain, receive
    pub fn step(&mut self) -> Result<()> {
        self.poll_trace()?;
        self.drain()?;
        self.receive()?;
        Ok(())
    }

    /// Step until `stop` is set or an error ends the session
    pub fn run_until(&mut self, stop: &AtomicBool) -> Result<()> {
        while !stop.load(Ordering::SeqCst) {
            self.step()?;
        }
        Ok(())
    }

    /// Read one trace batch and queue every completed bus write
    pub fn poll_trace(&mut self) -> Result<()> {
        let events = match self.port.device.read_trace(&mut self.decoder) {
            Ok(events) => events,
            Err(e) => {
                let e = BridgeError::from(e);
                if e.is_recoverable() {
                    log::warn!("Dropping trace batch: {}", e);
                    return Ok(());
                }
                return Err(e);
            }
        };

        for event in events {
            if let BusEvent::WriteComplete(write) = event {
                self.enqueue(write)?;
            }
        }
        Ok(())
    }

    /// Queue an intercepted write
    pub fn enqueue(&mut self, write: PendingWriteRequest) -> Result<()> {
        self.queue
            .enqueue(write)
            .map_err(|_| BridgeError::OutOfMemory)
    }

    /// Apply queued writes as far as the lock state allows
    pub fn drain(&mut self) -> Result<()> {
        self.queue.drain(&mut self.lock, &mut self.port)
    }

    /// Move bytes that arrived from the peer into the staging buffer
    pub fn receive(&mut self) -> Result<usize> {
        self.port.receive()
    }

    /// Current lock state
    pub fn lock_state(&self) -> FlashLockState {
        self.lock
    }

    /// Number of writes waiting in the queue
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Bytes received from the peer and not yet acknowledged
    pub fn staged(&self) -> &[u8] {
        &self.port.staging
    }

    /// Whether received bytes still have to be announced
    pub fn new_data_pending(&self) -> bool {
        self.port.new_data
    }

    /// The flash mirror
    pub fn mirror(&self) -> &[u8] {
        &self.port.mirror
    }

    /// End the session, returning the mirror
    pub fn into_mirror(self) -> Vec<u8> {
        self.port.mirror
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rem100_core::trace::ReportBuilder;
    use rem100_dummy::DummyEm100;
    use std::collections::VecDeque;

    /// Peer link fed from a script
    #[derive(Default)]
    pub(crate) struct MockLink {
        pub inbound: VecDeque<Vec<u8>>,
        pub sent: Vec<Vec<u8>>,
        pub closed: bool,
    }

    impl PeerLink for MockLink {
        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn poll_recv(&mut self, buf: &mut [u8]) -> Result<usize> {
            let Some(mut chunk) = self.inbound.pop_front() else {
                if self.closed {
                    return Err(BridgeError::PeerDisconnected);
                }
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            if n < chunk.len() {
                self.inbound.push_front(chunk.split_off(n));
            }
            Ok(n)
        }
    }

    pub(crate) fn image() -> Vec<u8> {
        vec![0xff; MIN_IMAGE_SIZE]
    }

    /// Script a page program the master issues, closed by a status read
    pub(crate) fn bus_write(em: &mut Emulator<DummyEm100>, id: u8, offset: u32, data: &[u8]) {
        let a = offset.to_be_bytes();
        let mut bus = vec![0x02, a[1], a[2], a[3]];
        bus.extend_from_slice(data);
        em.transport_mut().push_trace_report(
            ReportBuilder::new()
                .command(id, &bus)
                .command(id.wrapping_add(1), &[0x05, 0x00])
                .build(),
        );
    }

    fn word(em: &Emulator<DummyEm100>, offset: u32) -> u32 {
        let o = offset as usize;
        let sdram = em.transport().sdram();
        u32::from_le_bytes([sdram[o], sdram[o + 1], sdram[o + 2], sdram[o + 3]])
    }

    fn stage(session: &mut NetworkSession<'_, DummyEm100, &mut MockLink>) {
        session.step().unwrap();
        session.step().unwrap();
    }

    #[test]
    fn test_image_too_small() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        assert!(matches!(
            NetworkSession::new(&mut em, &mut link, vec![0; 0x1000]),
            Err(BridgeError::ImageTooSmall {
                size: 0x1000,
                required: MIN_IMAGE_SIZE
            })
        ));
    }

    #[test]
    fn test_start_publishes_unlocked() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        session.start().unwrap();
        assert_eq!(
            &session.mirror()[LOCK_OFFSET as usize..][..4],
            &magic::UNLOCKED.to_le_bytes()
        );
        drop(session);

        assert_eq!(word(&em, LOCK_OFFSET), magic::UNLOCKED);
        assert!(em.transport().is_running());
    }

    #[test]
    fn test_flash_write_updates_mirror_only() {
        let mut em = Emulator::new(DummyEm100::new_default());
        bus_write(&mut em, 1, 0x1000, &[1, 2, 3]);
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();

        session.step().unwrap();
        assert_eq!(&session.mirror()[0x1000..0x1003], &[1, 2, 3]);
        assert_eq!(session.queued(), 0);
        drop(session);

        assert_eq!(&em.transport().sdram()[0x1000..0x1003], &[0xff; 3]);
    }

    #[test]
    fn test_message_window_forwarded_to_peer() {
        let mut em = Emulator::new(DummyEm100::new_default());
        bus_write(&mut em, 1, MESSAGE_WINDOW_OFFSET, b"hello");
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();

        session.step().unwrap();
        drop(session);
        assert_eq!(link.sent, vec![b"hello".to_vec()]);
    }

    #[test]
    fn test_received_bytes_are_announced() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        link.inbound.push_back(b"abc".to_vec());
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();

        session.step().unwrap();
        assert_eq!(session.staged(), b"abc");
        assert!(session.new_data_pending());

        session.step().unwrap();
        assert!(!session.new_data_pending());
        drop(session);
        assert_eq!(word(&em, DATA_AVAILABLE_OFFSET), magic::AVAILABLE);
    }

    #[test]
    fn test_staging_never_overflows() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        link.inbound.push_back(vec![0x55; 300]);
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();

        session.step().unwrap();
        assert_eq!(session.staged().len(), STAGING_BUFFER_SIZE);
        // Full buffer: nothing more is read
        assert_eq!(session.receive().unwrap(), 0);
        drop(session);
        assert_eq!(link.inbound.front().map(Vec::len), Some(300 - STAGING_BUFFER_SIZE));
    }

    #[test]
    fn test_lock_publishes_staged_bytes() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        link.inbound.push_back(b"abc".to_vec());
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        session.step().unwrap();

        session
            .enqueue(PendingWriteRequest::new(
                LOCK_OFFSET,
                magic::LOCK_REQUEST.to_le_bytes().to_vec(),
            ))
            .unwrap();
        session.drain().unwrap();
        assert_eq!(session.lock_state(), FlashLockState::Locked);
        assert!(!session.new_data_pending());
        drop(session);

        assert_eq!(word(&em, LOCK_OFFSET), magic::LOCKED);
        assert_eq!(word(&em, AVAILABLE_COUNT_OFFSET), 3);
        assert_eq!(word(&em, DATA_AVAILABLE_OFFSET), magic::AVAILABLE);
        let window = MESSAGE_WINDOW_OFFSET as usize;
        assert_eq!(&em.transport().sdram()[window..window + 3], b"abc");
    }

    #[test]
    fn test_bus_write_to_lock_word_locks() {
        let mut em = Emulator::new(DummyEm100::new_default());
        bus_write(&mut em, 1, LOCK_OFFSET, &magic::LOCK_REQUEST.to_le_bytes());
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();

        session.step().unwrap();
        assert_eq!(session.lock_state(), FlashLockState::Locked);
        assert_eq!(
            &session.mirror()[LOCK_OFFSET as usize..][..4],
            &magic::LOCKED.to_le_bytes()
        );
    }

    #[test]
    fn test_acknowledge_and_unlock() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        link.inbound.push_back(b"abcdef".to_vec());
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        stage(&mut session);
        session
            .enqueue(PendingWriteRequest::new(
                LOCK_OFFSET,
                magic::LOCK_REQUEST.to_le_bytes().to_vec(),
            ))
            .unwrap();
        session.drain().unwrap();
        assert_eq!(session.lock_state(), FlashLockState::Locked);

        // Partial acknowledgement while locked waits for the unlock
        session
            .enqueue(PendingWriteRequest::new(
                AVAILABLE_COUNT_OFFSET,
                2u32.to_le_bytes().to_vec(),
            ))
            .unwrap();
        session.drain().unwrap();
        assert_eq!(session.staged(), b"abcdef");

        session
            .enqueue(PendingWriteRequest::new(
                LOCK_OFFSET,
                magic::UNLOCK_REQUEST.to_le_bytes().to_vec(),
            ))
            .unwrap();
        session.drain().unwrap();
        assert_eq!(session.lock_state(), FlashLockState::Unlocked);
        assert_eq!(session.staged(), b"cdef");
        assert_eq!(session.queued(), 0);

        session
            .enqueue(PendingWriteRequest::new(
                AVAILABLE_COUNT_OFFSET,
                4u32.to_le_bytes().to_vec(),
            ))
            .unwrap();
        session.drain().unwrap();
        assert!(session.staged().is_empty());
        drop(session);

        assert_eq!(word(&em, DATA_AVAILABLE_OFFSET), 0);
        assert_eq!(word(&em, LOCK_OFFSET), magic::UNLOCKED);
        assert!(em.transport().is_running());
    }

    #[test]
    fn test_overlong_acknowledgement_aborts() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        link.inbound.push_back(b"abc".to_vec());
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        session.step().unwrap();

        session
            .enqueue(PendingWriteRequest::new(
                AVAILABLE_COUNT_OFFSET,
                10u32.to_le_bytes().to_vec(),
            ))
            .unwrap();
        assert!(matches!(session.drain(), Err(BridgeError::Protocol(_))));
        drop(session);

        // Emulation is resumed even though the pass failed
        assert!(em.transport().is_running());
    }

    #[test]
    fn test_malformed_acknowledgement_aborts() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        session
            .enqueue(PendingWriteRequest::new(AVAILABLE_COUNT_OFFSET, vec![0, 0]))
            .unwrap();
        assert!(matches!(session.drain(), Err(BridgeError::Protocol(_))));
    }

    #[test]
    fn test_write_outside_image_goes_raw() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let beyond = MIN_IMAGE_SIZE as u32 + 0x100;
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        session
            .enqueue(PendingWriteRequest::new(beyond, vec![0xaa, 0xbb]))
            .unwrap();
        session.drain().unwrap();
        drop(session);

        let o = beyond as usize;
        assert_eq!(&em.transport().sdram()[o..o + 2], &[0xaa, 0xbb]);
    }

    #[test]
    fn test_short_trace_batch_is_recoverable() {
        let mut em = Emulator::new(DummyEm100::new_default());
        em.transport_mut().push_trace_report(vec![0; 10]);
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        session.step().unwrap();
        session.step().unwrap();
    }

    #[test]
    fn test_peer_disconnect_is_fatal() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink {
            closed: true,
            ..Default::default()
        };
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        assert!(matches!(
            session.step(),
            Err(BridgeError::PeerDisconnected)
        ));
    }

    #[test]
    fn test_run_until_stops() {
        let mut em = Emulator::new(DummyEm100::new_default());
        let mut link = MockLink::default();
        let mut session = NetworkSession::new(&mut em, &mut link, image()).unwrap();
        let stop = AtomicBool::new(true);
        session.run_until(&stop).unwrap();
    }
}
