//! Wire messages for the socket variant.
//!
//! Every message travels as a frame: a 4-byte big-endian body length
//! followed by the prost-encoded body. A connection carries any number of
//! request/response pairs, strictly alternating.

use prost::Message;

use crate::{Element, Error, Matrix};

/// Size of the length prefix in bytes.
pub const LEN_PREFIX: usize = 4;

/// Largest body accepted by [`check_frame_len`].
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Largest product, in elements, a request may ask for. Its answer has to
/// fit in one frame.
pub const MAX_PRODUCT_LEN: usize = MAX_FRAME_LEN / std::mem::size_of::<Element>();

/// Multiply `a` (n1×n2) by `b` (n2×n3) using the named backend.
#[derive(Clone, PartialEq, Message)]
pub struct MulRequest {
    #[prost(string, tag = "1")]
    pub strategy: String,
    #[prost(uint32, tag = "2")]
    pub n1: u32,
    #[prost(uint32, tag = "3")]
    pub n2: u32,
    #[prost(uint32, tag = "4")]
    pub n3: u32,
    #[prost(sint32, repeated, tag = "5")]
    pub a: Vec<Element>,
    #[prost(sint32, repeated, tag = "6")]
    pub b: Vec<Element>,
}

/// Result of a [`MulRequest`]. Times are microseconds spent inside the
/// backend only; `error` is an errno value, zero on success.
#[derive(Clone, PartialEq, Message)]
pub struct MulResponse {
    #[prost(int64, tag = "1")]
    pub utime: i64,
    #[prost(int64, tag = "2")]
    pub stime: i64,
    #[prost(int64, tag = "3")]
    pub wall: i64,
    #[prost(int32, tag = "4")]
    pub error: i32,
    #[prost(string, tag = "5")]
    pub message: String,
    #[prost(sint32, repeated, tag = "6")]
    pub c: Vec<Element>,
}

impl MulRequest {
    pub fn new(strategy: impl Into<String>, a: &Matrix, b: &Matrix) -> Self {
        Self {
            strategy: strategy.into(),
            n1: a.rows() as u32,
            n2: a.cols() as u32,
            n3: b.cols() as u32,
            a: a.as_slice().to_vec(),
            b: b.as_slice().to_vec(),
        }
    }

    /// Rebuilds the operands, checking that the data matches the declared
    /// dimensions and that the product is neither empty nor larger than
    /// [`MAX_PRODUCT_LEN`].
    pub fn operands(&self) -> Result<(Matrix, Matrix), Error> {
        let (n1, n2, n3) = (self.n1 as usize, self.n2 as usize, self.n3 as usize);
        if n1 == 0 || n2 == 0 || n3 == 0 {
            return Err(Error::Empty(n1, n2, n3));
        }
        match n1.checked_mul(n3) {
            Some(len) if len <= MAX_PRODUCT_LEN => {}
            _ => return Err(Error::TooLarge(n1, n3)),
        }
        let a = Matrix::from_vec(n1, n2, self.a.clone())?;
        let b = Matrix::from_vec(n2, n3, self.b.clone())?;
        Ok((a, b))
    }
}

impl MulResponse {
    pub fn failed(error: i32, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Formats the timing line a traced client logs after each call.
    pub fn timing_line(&self) -> String {
        format!(
            "utime: {}, stime: {}, wall: {}",
            self.utime, self.stime, self.wall
        )
    }
}

/// Encodes `msg` as a length-prefixed frame.
pub fn encode_frame<M: Message>(msg: &M) -> Vec<u8> {
    let len = msg.encoded_len();
    let mut buf = Vec::with_capacity(LEN_PREFIX + len);
    buf.extend_from_slice(&(len as u32).to_be_bytes());
    msg.encode_raw(&mut buf);
    buf
}

/// Reads the body length out of a frame prefix and checks it against
/// [`MAX_FRAME_LEN`].
pub fn check_frame_len(prefix: [u8; LEN_PREFIX]) -> Result<usize, Error> {
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    Ok(len)
}

/// Decodes a frame body (without its prefix).
pub fn decode_body<M: Message + Default>(body: &[u8]) -> Result<M, Error> {
    Ok(M::decode(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_prefix_holds_body_length() {
        let a = Matrix::from_rows(vec![vec![1, -2], vec![3, 4]]).unwrap();
        let b = Matrix::from_rows(vec![vec![5], vec![6]]).unwrap();
        let request = MulRequest::new("pipes", &a, &b);

        let frame = encode_frame(&request);
        let mut prefix = [0u8; LEN_PREFIX];
        prefix.copy_from_slice(&frame[..LEN_PREFIX]);
        let len = check_frame_len(prefix).unwrap();
        assert_eq!(len, frame.len() - LEN_PREFIX);

        let decoded: MulRequest = decode_body(&frame[LEN_PREFIX..]).unwrap();
        assert_eq!(decoded.strategy, "pipes");
        let (a2, b2) = decoded.operands().unwrap();
        assert_eq!(a2, a);
        assert_eq!(b2, b);
    }

    #[test]
    fn oversized_frames_are_rejected() {
        let prefix = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(matches!(
            check_frame_len(prefix),
            Err(Error::FrameTooLarge(_))
        ));
    }

    #[test]
    fn inconsistent_operands_are_rejected() {
        let request = MulRequest {
            strategy: "naive".into(),
            n1: 2,
            n2: 2,
            n3: 1,
            a: vec![1, 2, 3],
            b: vec![1, 1],
        };
        assert!(matches!(request.operands(), Err(Error::Shape { .. })));
    }

    #[test]
    fn empty_dimensions_are_rejected() {
        let request = MulRequest {
            strategy: "naive".into(),
            n1: 1 << 20,
            n2: 0,
            n3: 1 << 20,
            a: vec![],
            b: vec![],
        };
        assert!(matches!(
            request.operands(),
            Err(Error::Empty(1_048_576, 0, 1_048_576))
        ));
    }

    #[test]
    fn oversized_products_are_rejected() {
        let n = 5000;
        let request = MulRequest {
            strategy: "naive".into(),
            n1: n,
            n2: 1,
            n3: n,
            a: vec![1; n as usize],
            b: vec![1; n as usize],
        };
        assert!(matches!(request.operands(), Err(Error::TooLarge(5000, 5000))));

        let request = MulRequest {
            n1: 1,
            n3: u32::MAX,
            ..request
        };
        assert!(matches!(request.operands(), Err(Error::TooLarge(..))));
    }

    #[test]
    fn timing_line_format() {
        let response = MulResponse {
            utime: 12,
            stime: 0,
            wall: 40,
            ..Default::default()
        };
        assert_eq!(response.timing_line(), "utime: 12, stime: 0, wall: 40");
    }
}
