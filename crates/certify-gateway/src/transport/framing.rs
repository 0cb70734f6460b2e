//! Frame readers and writers over any async byte stream.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use certify_core::error::{ProtocolError, Reply, Result};
use certify_core::protocol::envelope::{self, Envelope, HEADER_LEN};

/// Byte stream a device is connected through (TCP in production, duplex in tests).
pub trait DeviceStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> DeviceStream for T {}

/// Owned connection handed from the dispatcher to a flow.
pub type BoxedStream = Box<dyn DeviceStream>;

/// One read of at most `max` bytes. `None` means the peer closed the stream.
pub async fn read_frame<R>(r: &mut R, max: usize) -> Result<Option<Bytes>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; max];
    let n = r.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some(Bytes::from(buf)))
}

/// Read until `buf` is full or the stream ends; returns the bytes filled.
async fn fill<R>(r: &mut R, buf: &mut [u8]) -> Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = r.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one envelope: exactly 48 header bytes, then exactly `payload_len` bytes.
///
/// The header is unauthenticated until the payload is in, so a declared
/// length above `max_payload` is refused before any payload byte is read.
pub async fn read_envelope<R>(r: &mut R, max_payload: usize) -> Result<Envelope>
where
    R: AsyncRead + Unpin,
{
    let mut raw = [0u8; HEADER_LEN];
    let got = fill(r, &mut raw).await?;
    if got < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            needed: HEADER_LEN,
            available: got,
        }
        .into());
    }
    let header = envelope::decode_header(&raw)?;

    let declared = header.payload_len();
    if declared > max_payload {
        return Err(ProtocolError::PayloadTooLarge {
            declared,
            max: max_payload,
        }
        .into());
    }
    let mut payload = Vec::with_capacity(declared);
    (&mut *r).take(declared as u64).read_to_end(&mut payload).await?;
    if payload.len() < declared {
        return Err(ProtocolError::LengthMismatch {
            declared,
            received: payload.len(),
        }
        .into());
    }

    Ok(Envelope {
        header,
        payload: Bytes::from(payload),
    })
}

/// Encode `payload` into an envelope and write it.
pub async fn send_envelope<W>(w: &mut W, payload: &[u8], authenticate: bool, key: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let wire = envelope::encode(payload, authenticate, false, key)?;
    w.write_all(&wire).await?;
    w.flush().await?;
    Ok(())
}

/// Write a two-byte OK/KO reply.
pub async fn send_reply<W>(w: &mut W, reply: Reply) -> Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    w.write_all(reply.as_bytes()).await?;
    w.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use certify_core::error::CertifyError;
    use tokio::io::duplex;

    const KEY: [u8; 32] = [0x11; 32];

    #[tokio::test]
    async fn envelope_roundtrips_through_a_stream() {
        let (mut a, mut b) = duplex(4096);
        send_envelope(&mut a, b"\x0fpayload", true, &KEY).await.unwrap();
        let env = read_envelope(&mut b, 64).await.unwrap();
        assert_eq!(&env.payload[..], b"\x0fpayload");
        assert!(env.verify(&KEY));
    }

    #[tokio::test]
    async fn short_payload_then_close_is_length_mismatch() {
        let (mut a, mut b) = duplex(4096);
        let mut wire = envelope::encode(&[0u8; 1000], false, false, &KEY).unwrap().to_vec();
        wire.truncate(HEADER_LEN + 10);
        a.write_all(&wire).await.unwrap();
        drop(a);

        let err = read_envelope(&mut b, 4096).await.unwrap_err();
        assert!(matches!(
            err,
            CertifyError::Protocol(ProtocolError::LengthMismatch { declared: 1000, received: 10 })
        ));
    }

    #[tokio::test]
    async fn declared_length_above_limit_is_refused_before_reading() {
        let (mut a, mut b) = duplex(4096);
        let mut header = envelope::encode(&[], false, false, &KEY).unwrap().to_vec();
        header[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        // header only: the payload never arrives and is never waited for
        a.write_all(&header).await.unwrap();

        let err = read_envelope(&mut b, 4096).await.unwrap_err();
        assert!(matches!(
            err,
            CertifyError::Protocol(ProtocolError::PayloadTooLarge { declared, max: 4096 })
                if declared == u32::MAX as usize
        ));
        assert_eq!(err.reply(), None);
    }

    #[tokio::test]
    async fn short_header_then_close_is_truncated() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0u8; 20]).await.unwrap();
        drop(a);
        let err = read_envelope(&mut b, 4096).await.unwrap_err();
        assert_eq!(err.kind(), "truncated");
    }

    #[tokio::test]
    async fn frames_are_bounded_and_eof_is_none() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[7u8; 10]).await.unwrap();
        let f = read_frame(&mut b, 4).await.unwrap().unwrap();
        assert_eq!(f.len(), 4);
        drop(a);
        let mut rest = 0;
        while let Some(f) = read_frame(&mut b, 4).await.unwrap() {
            rest += f.len();
        }
        assert_eq!(rest, 6);
    }
}
