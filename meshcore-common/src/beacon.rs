//! Secure Network Beacon payload codec.
//!
//! The 13-octet payload is authenticated out of band; only the
//! cleartext layout is handled here.

use crate::{InsufficientBuffer, IvIndex, IvUpdateFlag, KeyRefreshFlag, NetworkId, ParseError};
use heapless::Vec;

/// Length of the beacon payload covered by the authentication value.
pub const BEACON_PAYLOAD_LEN: usize = 13;

/// Decoded Secure Network Beacon payload: flags, subnet identity and
/// the advertised IV index.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecureNetworkBeacon {
    key_refresh_flag: KeyRefreshFlag,
    iv_update_flag: IvUpdateFlag,
    network_id: NetworkId,
    iv_index: IvIndex,
}

impl SecureNetworkBeacon {
    pub fn new(
        key_refresh_flag: KeyRefreshFlag,
        iv_update_flag: IvUpdateFlag,
        network_id: NetworkId,
        iv_index: IvIndex,
    ) -> Self {
        Self {
            key_refresh_flag,
            iv_update_flag,
            network_id,
            iv_index,
        }
    }

    /// Parse the 13-octet beacon payload. Reserved flag bits are
    /// ignored; any other payload length is rejected.
    pub fn parse(payload: &[u8]) -> Result<Self, ParseError> {
        if payload.len() != BEACON_PAYLOAD_LEN {
            return Err(ParseError::InvalidLength);
        }

        let flags = payload[0];
        let network_id = NetworkId::new(
            payload[1..9]
                .try_into()
                .map_err(|_| ParseError::InvalidLength)?,
        );
        let iv_index = IvIndex::parse(&payload[9..13])?;

        Ok(Self {
            key_refresh_flag: KeyRefreshFlag::parse(flags & 0b00000001),
            iv_update_flag: IvUpdateFlag::parse(flags & 0b00000010),
            network_id,
            iv_index,
        })
    }

    pub fn emit<const N: usize>(&self, xmit: &mut Vec<u8, N>) -> Result<(), InsufficientBuffer> {
        let mut flags = 0;
        self.key_refresh_flag.emit(&mut flags);
        self.iv_update_flag.emit(&mut flags);

        xmit.push(flags).map_err(|_| InsufficientBuffer)?;
        xmit.extend_from_slice(self.network_id.as_bytes())
            .map_err(|_| InsufficientBuffer)?;
        xmit.extend_from_slice(&self.iv_index.to_be_bytes())
            .map_err(|_| InsufficientBuffer)?;
        Ok(())
    }

    pub fn key_refresh_flag(&self) -> KeyRefreshFlag {
        self.key_refresh_flag
    }

    pub fn iv_update_flag(&self) -> IvUpdateFlag {
        self.iv_update_flag
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn iv_index(&self) -> IvIndex {
        self.iv_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETWORK_ID: [u8; 8] = [0x3E, 0xCA, 0xFF, 0x67, 0x2F, 0x67, 0x33, 0x70];

    #[test]
    fn parse_flags_and_iv() {
        let mut payload = [0u8; 13];
        payload[0] = 0b00000011;
        payload[1..9].copy_from_slice(&NETWORK_ID);
        payload[9..13].copy_from_slice(&0x1234_5678u32.to_be_bytes());

        let beacon = SecureNetworkBeacon::parse(&payload).unwrap();
        assert_eq!(beacon.key_refresh_flag(), KeyRefreshFlag(true));
        assert_eq!(beacon.iv_update_flag(), IvUpdateFlag::InProgress);
        assert_eq!(beacon.network_id(), NetworkId::new(NETWORK_ID));
        assert_eq!(beacon.iv_index(), IvIndex::new(0x1234_5678));
    }

    #[test]
    fn parse_ignores_reserved_flag_bits() {
        let mut payload = [0u8; 13];
        payload[0] = 0b11111100;
        payload[1..9].copy_from_slice(&NETWORK_ID);

        let beacon = SecureNetworkBeacon::parse(&payload).unwrap();
        assert_eq!(beacon.key_refresh_flag(), KeyRefreshFlag(false));
        assert_eq!(beacon.iv_update_flag(), IvUpdateFlag::Normal);
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert_eq!(
            SecureNetworkBeacon::parse(&[0u8; 12]),
            Err(ParseError::InvalidLength)
        );
        assert_eq!(
            SecureNetworkBeacon::parse(&[0u8; 14]),
            Err(ParseError::InvalidLength)
        );
    }

    #[test]
    fn emit_round_trip() {
        let beacon = SecureNetworkBeacon::new(
            KeyRefreshFlag(false),
            IvUpdateFlag::InProgress,
            NetworkId::new(NETWORK_ID),
            IvIndex::new(0x11),
        );

        let mut xmit: Vec<u8, BEACON_PAYLOAD_LEN> = Vec::new();
        beacon.emit(&mut xmit).unwrap();
        assert_eq!(xmit.len(), BEACON_PAYLOAD_LEN);
        assert_eq!(SecureNetworkBeacon::parse(&xmit).unwrap(), beacon);
    }
}
