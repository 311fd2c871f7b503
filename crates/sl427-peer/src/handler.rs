use std::net::SocketAddr;

use sl427_message::{code, Control, Direction, UserData};

use crate::connection::Received;
use crate::error::Result;

/// Per-connection message handler invoked by the server workers.
///
/// Returning `Ok(Some(reply))` writes the reply back on the same connection.
/// An `Err` is logged and counted as dropped; the connection stays open.
pub trait FrameHandler: Send + Sync {
    fn handle(&self, peer: SocketAddr, received: &Received) -> Result<Option<UserData>>;
}

impl<F> FrameHandler for F
where
    F: Fn(SocketAddr, &Received) -> Result<Option<UserData>> + Send + Sync,
{
    fn handle(&self, peer: SocketAddr, received: &Received) -> Result<Option<UserData>> {
        self(peer, received)
    }
}

/// Confirms every valid uplink with a downlink acknowledgement.
#[derive(Debug, Clone, Copy, Default)]
pub struct AckHandler {
    password: u16,
}

impl AckHandler {
    pub fn new(password: u16) -> Self {
        Self { password }
    }

    pub fn password(&self) -> u16 {
        self.password
    }

    /// The confirmation for one uplink message.
    pub fn ack_for(&self, uplink: &UserData) -> UserData {
        let control = Control::downlink(code::CONFIRM).with_frame_count(uplink.control.frame_count());
        let mut ack = UserData::new(control, uplink.address, uplink.afn)
            .with_data(vec![0x00])
            .with_password(self.password);
        if let Some(user_afn) = uplink.user_afn {
            ack = ack.with_user_afn(user_afn);
        }
        ack
    }
}

impl FrameHandler for AckHandler {
    fn handle(&self, _peer: SocketAddr, received: &Received) -> Result<Option<UserData>> {
        let message = &received.message;
        if message.control.direction() == Direction::Downlink {
            return Ok(None);
        }
        message.validate()?;
        Ok(Some(self.ack_for(message)))
    }
}

#[cfg(test)]
mod tests {
    use sl427_message::{Address, AdminAddress, Afn, CodedAddress, MessageError};

    use super::*;
    use crate::error::PeerError;

    fn peer() -> SocketAddr {
        "127.0.0.1:9000".parse().expect("socket address should parse")
    }

    fn received(message: UserData) -> Received {
        let frame = message.to_frame().expect("message should frame");
        Received { frame, message }
    }

    fn admin() -> Address {
        Address::Admin(AdminAddress::new([0x21, 0x05, 0x25], 1234).expect("valid address"))
    }

    #[test]
    fn acks_uplink_with_echoed_fields() {
        let uplink = UserData::new(
            Control::uplink(code::WATER_LEVEL).with_frame_count(3),
            admin(),
            Afn::UPLOAD,
        )
        .with_data(vec![1, 2, 3]);

        let ack = AckHandler::new(0x1234)
            .handle(peer(), &received(uplink))
            .expect("handler should succeed")
            .expect("uplink should be acknowledged");

        assert_eq!(ack.control.direction(), Direction::Downlink);
        assert_eq!(ack.control.code(), code::CONFIRM);
        assert_eq!(ack.control.frame_count(), 3);
        assert_eq!(ack.address, admin());
        assert_eq!(ack.afn, Afn::UPLOAD);
        assert_eq!(ack.data, vec![0x00]);
        assert_eq!(ack.password, Some(0x1234));
        ack.validate().expect("ack should validate");
    }

    #[test]
    fn ack_survives_the_wire() {
        let uplink = UserData::new(Control::uplink(code::CONFIRM), admin(), Afn::UPLOAD);
        let ack = AckHandler::new(0xBEEF).ack_for(&uplink);

        let wire = ack.to_frame_bytes().expect("ack should encode");
        let decoded = UserData::from_frame_bytes(&wire).expect("ack should decode");
        assert_eq!(decoded, ack);
    }

    #[test]
    fn user_defined_afn_is_echoed() {
        let coded = Address::Coded(CodedAddress::new([0x80, 0x00, 0x00, 0x01]));
        let uplink =
            UserData::new(Control::uplink(code::RAIN), coded, Afn::USER_DEFINED).with_user_afn(0x42);

        let ack = AckHandler::new(1).ack_for(&uplink);
        assert_eq!(ack.afn, Afn::USER_DEFINED);
        assert_eq!(ack.user_afn, Some(0x42));
    }

    #[test]
    fn downlink_gets_no_reply() {
        let downlink =
            UserData::new(Control::downlink(code::CONFIRM), admin(), Afn::UPLOAD).with_password(7);
        let reply = AckHandler::new(7)
            .handle(peer(), &received(downlink))
            .expect("handler should succeed");
        assert!(reply.is_none());
    }

    #[test]
    fn invalid_uplink_is_rejected() {
        let unknown_afn = UserData::new(Control::uplink(code::RAIN), admin(), Afn(0x10));
        let err = AckHandler::new(7)
            .handle(peer(), &received(unknown_afn))
            .expect_err("unknown AFN should be rejected");
        assert!(matches!(err, PeerError::Message(MessageError::Data(_))));
        assert!(err.is_recoverable());
    }

    #[test]
    fn closures_are_handlers() {
        let handler = |_peer: SocketAddr, received: &Received| -> Result<Option<UserData>> {
            Ok(Some(received.message.clone()))
        };
        let message = UserData::new(Control::uplink(code::RAIN), admin(), Afn::UPLOAD);
        let reply = handler
            .handle(peer(), &received(message.clone()))
            .expect("closure handler should succeed");
        assert_eq!(reply, Some(message));
    }
}
