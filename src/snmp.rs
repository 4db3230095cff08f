//! Minimal SNMPv1 GET client: a BER encoder for `GetRequest` PDUs, a decoder
//! for `GetResponse` PDUs, and a UDP transport that carries them.
//!
//! Only the subset needed to read a handful of scalar counters is supported.
//! Requests always carry `NULL` values; responses are reduced to
//! [`Value::Text`] or [`Value::Integer`] for the engine.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicI32, Ordering};
use anyhow::{Context, Result};
use async_trait::async_trait;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::{debug, trace};
use crate::oid::PrinterOid;
use crate::traits::SnmpTransport;

pub const SNMP_PORT: u16 = 161;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_IP_ADDRESS: u8 = 0x40;
const TAG_COUNTER32: u8 = 0x41;
const TAG_GAUGE32: u8 = 0x42;
const TAG_TIMETICKS: u8 = 0x43;
const TAG_COUNTER64: u8 = 0x46;
const PDU_GET_REQUEST: u8 = 0xA0;
const PDU_GET_RESPONSE: u8 = 0xA2;

const VERSION_1: i64 = 0;

/// Typed value of one variable binding, as far as the bridge cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Integer(i64),
    /// NULL, IpAddress, OIDs and v2 exceptions: never fed into counters.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Vec<u32>,
    pub value: Value,
}

impl VarBind {
    pub fn text(oid: PrinterOid, value: &str) -> Self {
        Self {
            oid: oid.arcs().to_vec(),
            value: Value::Text(value.to_string()),
        }
    }

    pub fn integer(oid: PrinterOid, value: i64) -> Self {
        Self {
            oid: oid.arcs().to_vec(),
            value: Value::Integer(value),
        }
    }
}

/// Decoded `GetResponse` PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub request_id: i32,
    pub error_status: i64,
    pub error_index: i64,
    pub bindings: Vec<VarBind>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet truncated at offset {0}")]
    Truncated(usize),
    #[error("unexpected tag 0x{found:02x}, expected 0x{expected:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("unsupported length encoding")]
    BadLength,
    #[error("integer does not fit in 64 bits")]
    IntegerOverflow,
    #[error("malformed object identifier")]
    BadOid,
    #[error("unsupported SNMP version {0}")]
    Version(i64),
    #[error("not a GetResponse PDU (tag 0x{0:02x})")]
    NotResponse(u8),
}

fn push_length(out: &mut Vec<u8>, len: usize) {
    if len < 0x80 {
        out.push(len as u8);
        return;
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.push(0x80 | (4 - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
}

fn push_tlv(out: &mut Vec<u8>, tag: u8, content: &[u8]) {
    out.push(tag);
    push_length(out, content.len());
    out.extend_from_slice(content);
}

fn encode_integer(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    // Drop redundant sign bytes, keeping the sign bit of the next byte intact.
    while start < 7 {
        let (b, next) = (bytes[start], bytes[start + 1]);
        if (b == 0x00 && next & 0x80 == 0) || (b == 0xFF && next & 0x80 != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

fn encode_oid(arcs: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(arcs.len() + 4);
    let (first, rest) = match arcs {
        [a, b, rest @ ..] => (a * 40 + b, rest),
        [a] => (a * 40, &[][..]),
        [] => return out,
    };
    for arc in std::iter::once(first).chain(rest.iter().copied()) {
        let mut chunk = [0u8; 5];
        let mut n = 0;
        let mut v = arc;
        loop {
            chunk[n] = (v & 0x7F) as u8;
            n += 1;
            v >>= 7;
            if v == 0 {
                break;
            }
        }
        for i in (0..n).rev() {
            let cont = if i == 0 { 0 } else { 0x80 };
            out.push(chunk[i] | cont);
        }
    }
    out
}

/// Encode an SNMPv1 `GetRequest` for the given identifiers.
pub fn encode_get_request(community: &str, request_id: i32, oids: &[PrinterOid]) -> Vec<u8> {
    let mut list = Vec::new();
    for oid in oids {
        let mut bind = Vec::new();
        push_tlv(&mut bind, TAG_OID, &encode_oid(oid.arcs()));
        push_tlv(&mut bind, TAG_NULL, &[]);
        push_tlv(&mut list, TAG_SEQUENCE, &bind);
    }

    let mut pdu = Vec::new();
    push_tlv(&mut pdu, TAG_INTEGER, &encode_integer(request_id as i64));
    push_tlv(&mut pdu, TAG_INTEGER, &encode_integer(0));
    push_tlv(&mut pdu, TAG_INTEGER, &encode_integer(0));
    push_tlv(&mut pdu, TAG_SEQUENCE, &list);

    let mut msg = Vec::new();
    push_tlv(&mut msg, TAG_INTEGER, &encode_integer(VERSION_1));
    push_tlv(&mut msg, TAG_OCTET_STRING, community.as_bytes());
    push_tlv(&mut msg, PDU_GET_REQUEST, &pdu);

    let mut out = Vec::with_capacity(msg.len() + 4);
    push_tlv(&mut out, TAG_SEQUENCE, &msg);
    out
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&mut self) -> Result<u8, CodecError> {
        let b = *self.buf.get(self.pos).ok_or(CodecError::Truncated(self.pos))?;
        self.pos += 1;
        Ok(b)
    }

    fn length(&mut self) -> Result<usize, CodecError> {
        let first = self.byte()?;
        if first & 0x80 == 0 {
            return Ok(first as usize);
        }
        let n = (first & 0x7F) as usize;
        if n == 0 || n > 4 {
            return Err(CodecError::BadLength);
        }
        let mut len = 0usize;
        for _ in 0..n {
            len = (len << 8) | self.byte()? as usize;
        }
        Ok(len)
    }

    /// Read one TLV and return its tag and content.
    fn tlv(&mut self) -> Result<(u8, &'a [u8]), CodecError> {
        let tag = self.byte()?;
        let len = self.length()?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(CodecError::Truncated(self.pos))?;
        let buf = self.buf;
        let content = &buf[self.pos..end];
        self.pos = end;
        Ok((tag, content))
    }

    fn expect(&mut self, expected: u8) -> Result<&'a [u8], CodecError> {
        let (found, content) = self.tlv()?;
        if found != expected {
            return Err(CodecError::UnexpectedTag { expected, found });
        }
        Ok(content)
    }

    fn integer(&mut self) -> Result<i64, CodecError> {
        decode_integer(self.expect(TAG_INTEGER)?)
    }
}

fn decode_integer(bytes: &[u8]) -> Result<i64, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Truncated(0));
    }
    if bytes.len() > 8 {
        return Err(CodecError::IntegerOverflow);
    }
    let mut v: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
    for b in bytes {
        v = (v << 8) | *b as i64;
    }
    Ok(v)
}

fn decode_unsigned(bytes: &[u8]) -> Result<i64, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Truncated(0));
    }
    let bytes = match bytes.iter().position(|b| *b != 0) {
        Some(first) => &bytes[first..],
        None => return Ok(0),
    };
    if bytes.len() > 8 || (bytes.len() == 8 && bytes[0] & 0x80 != 0) {
        return Err(CodecError::IntegerOverflow);
    }
    Ok(bytes.iter().fold(0i64, |acc, b| (acc << 8) | *b as i64))
}

fn decode_oid(bytes: &[u8]) -> Result<Vec<u32>, CodecError> {
    let mut subids = Vec::with_capacity(bytes.len() + 1);
    let mut acc: u32 = 0;
    let mut pending = false;
    for b in bytes {
        acc = acc
            .checked_mul(128)
            .and_then(|v| v.checked_add((*b & 0x7F) as u32))
            .ok_or(CodecError::BadOid)?;
        pending = true;
        if b & 0x80 == 0 {
            subids.push(acc);
            acc = 0;
            pending = false;
        }
    }
    if pending || subids.is_empty() {
        return Err(CodecError::BadOid);
    }
    let first = subids[0];
    let (a, b) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = Vec::with_capacity(subids.len() + 1);
    arcs.push(a);
    arcs.push(b);
    arcs.extend_from_slice(&subids[1..]);
    Ok(arcs)
}

fn decode_value(tag: u8, content: &[u8]) -> Result<Value, CodecError> {
    Ok(match tag {
        TAG_INTEGER => Value::Integer(decode_integer(content)?),
        TAG_COUNTER32 | TAG_GAUGE32 | TAG_TIMETICKS | TAG_COUNTER64 => {
            Value::Integer(decode_unsigned(content)?)
        }
        TAG_OCTET_STRING => Value::Text(String::from_utf8_lossy(content).into_owned()),
        TAG_NULL | TAG_OID | TAG_IP_ADDRESS => Value::Unsupported,
        // noSuchObject / noSuchInstance / endOfMibView and anything unknown
        _ => Value::Unsupported,
    })
}

/// Decode an SNMPv1 (or v2c) `GetResponse` message.
pub fn decode_response(packet: &[u8]) -> Result<Response, CodecError> {
    let mut outer = Reader::new(packet);
    let mut msg = Reader::new(outer.expect(TAG_SEQUENCE)?);

    let version = msg.integer()?;
    if version != VERSION_1 && version != 1 {
        return Err(CodecError::Version(version));
    }
    msg.expect(TAG_OCTET_STRING)?;

    let (tag, pdu) = msg.tlv()?;
    if tag != PDU_GET_RESPONSE {
        return Err(CodecError::NotResponse(tag));
    }
    let mut pdu = Reader::new(pdu);
    let request_id = pdu.integer()? as i32;
    let error_status = pdu.integer()?;
    let error_index = pdu.integer()?;

    let mut list = Reader::new(pdu.expect(TAG_SEQUENCE)?);
    let mut bindings = Vec::new();
    while !list.is_empty() {
        let mut bind = Reader::new(list.expect(TAG_SEQUENCE)?);
        let oid = decode_oid(bind.expect(TAG_OID)?)?;
        let (tag, content) = bind.tlv()?;
        bindings.push(VarBind {
            oid,
            value: decode_value(tag, content)?,
        });
    }

    Ok(Response {
        request_id,
        error_status,
        error_index,
        bindings,
    })
}

/// SNMP manager socket. One socket serves both scan probes and polls;
/// responses are correlated only by source address, never by request id.
pub struct UdpSnmp {
    socket: UdpSocket,
    community: String,
    port: u16,
    next_id: AtomicI32,
}

impl UdpSnmp {
    pub async fn bind(community: impl Into<String>, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)))
            .await
            .context("failed to bind SNMP socket")?;
        Ok(Self {
            socket,
            community: community.into(),
            port,
            next_id: AtomicI32::new(1),
        })
    }

    /// Wait for the next datagram that decodes as a `GetResponse`.
    ///
    /// Undecodable datagrams are logged and skipped, so this only returns on
    /// a usable packet or a socket error.
    pub async fn recv(&self) -> Result<(Response, SocketAddr)> {
        let mut buf = vec![0u8; 1500];
        loop {
            let (n, from) = self
                .socket
                .recv_from(&mut buf)
                .await
                .context("SNMP socket receive failed")?;
            match decode_response(&buf[..n]) {
                Ok(resp) => return Ok((resp, from)),
                Err(e) => debug!(%from, error = %e, "dropping undecodable SNMP datagram"),
            }
        }
    }
}

#[async_trait]
impl SnmpTransport for UdpSnmp {
    async fn send_get(&self, target: Ipv4Addr, oids: &[PrinterOid]) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) & i32::MAX;
        let packet = encode_get_request(&self.community, id, oids);
        let dest = SocketAddrV4::new(target, self.port);
        self.socket
            .send_to(&packet, dest)
            .await
            .with_context(|| format!("SNMP send to {dest} failed"))?;
        trace!(%dest, request_id = id, oids = oids.len(), "SNMP GetRequest sent");
        Ok(())
    }
}
