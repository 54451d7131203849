//! MAC PDUs handed between the MAC and the PHY

use bytes::Bytes;
use common::{Rnti, SfnSf};

/// Logical channel used for padding-only PDUs
pub const LCID_PADDING: u8 = 3;

/// One MAC PDU with the routing tag the receiver uses to identify it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacPdu {
    /// Slot and var-TTI symbol start the PDU belongs to
    pub sfn_sf: SfnSf,
    pub rnti: Rnti,
    pub lcid: u8,
    pub payload: Bytes,
}

impl MacPdu {
    pub fn new(sfn_sf: SfnSf, rnti: Rnti, lcid: u8, payload: Bytes) -> Self {
        Self { sfn_sf, rnti, lcid, payload }
    }

    /// Zero-length PDU sent when a UE is scheduled but nothing is queued
    pub fn empty(sfn_sf: SfnSf, rnti: Rnti) -> Self {
        Self::new(sfn_sf, rnti, LCID_PADDING, Bytes::new())
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// PDUs transmitted together in one data var-TTI
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketBurst {
    pdus: Vec<MacPdu>,
}

impl PacketBurst {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pdu: MacPdu) {
        self.pdus.push(pdu);
    }

    pub fn pdus(&self) -> &[MacPdu] {
        &self.pdus
    }

    pub fn len(&self) -> usize {
        self.pdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pdus.is_empty()
    }

    /// Sum of payload sizes
    pub fn total_bytes(&self) -> usize {
        self.pdus.iter().map(MacPdu::len).sum()
    }

    /// Move every PDU to another slot, keeping symbol positions
    pub fn retag(&mut self, sfn_sf: SfnSf) {
        for pdu in &mut self.pdus {
            pdu.sfn_sf = SfnSf { symbol: pdu.sfn_sf.symbol, ..sfn_sf };
        }
    }
}

impl FromIterator<MacPdu> for PacketBurst {
    fn from_iter<I: IntoIterator<Item = MacPdu>>(iter: I) -> Self {
        Self { pdus: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pdu_carries_routing_tag() {
        let sfn = SfnSf::new(4, 1, 0, 3);
        let pdu = MacPdu::empty(sfn, Rnti(9));
        assert!(pdu.is_empty());
        assert_eq!(pdu.lcid, LCID_PADDING);
        assert_eq!(pdu.rnti, Rnti(9));
        assert_eq!(pdu.sfn_sf, sfn);
    }

    #[test]
    fn test_burst_retag() {
        let mut burst: PacketBurst = vec![
            MacPdu::new(SfnSf::new(1, 0, 0, 2), Rnti(1), 4, Bytes::from_static(b"abc")),
            MacPdu::new(SfnSf::new(1, 0, 0, 2), Rnti(1), 4, Bytes::from_static(b"de")),
        ]
        .into_iter()
        .collect();
        assert_eq!(burst.total_bytes(), 5);

        burst.retag(SfnSf::new(1, 0, 1, 0));
        assert!(burst.pdus().iter().all(|p| p.sfn_sf == SfnSf::new(1, 0, 1, 2)));
    }
}
