//! Async framing of wire messages over a byte stream.

use std::io;

use futures_util::stream::Stream;
use matmul_types::wire::{self, LEN_PREFIX};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Error;

pub async fn write_frame<W, M>(writer: &mut W, msg: &M) -> Result<(), Error>
where
    W: AsyncWrite + Unpin,
    M: Message,
{
    writer.write_all(&wire::encode_frame(msg)).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. Returns `Ok(None)` if the peer closed the stream
/// before the next frame started.
pub async fn read_frame<R, M>(reader: &mut R) -> Result<Option<M>, Error>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    let mut prefix = [0u8; LEN_PREFIX];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = wire::check_frame_len(prefix)?;
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(wire::decode_body(&body)?))
}

/// Turns a reader into a stream of decoded frames, ending when the peer
/// closes the stream.
pub fn frames<R, M>(mut reader: R) -> impl Stream<Item = Result<M, Error>>
where
    R: AsyncRead + Unpin,
    M: Message + Default,
{
    async_stream::try_stream! {
        while let Some(msg) = read_frame(&mut reader).await? {
            yield msg;
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use matmul_types::wire::MulResponse;

    use super::*;

    #[tokio::test]
    async fn frames_round_trip_over_duplex() {
        let (mut client, server) = tokio::io::duplex(1024);
        let first = MulResponse {
            wall: 3,
            c: vec![1, 2, 3],
            ..Default::default()
        };
        let second = MulResponse::failed(22, "bad");
        write_frame(&mut client, &first).await.unwrap();
        write_frame(&mut client, &second).await.unwrap();
        drop(client);

        let received: Vec<MulResponse> = frames(server)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(received, vec![first, second]);
    }

    #[tokio::test]
    async fn torn_frame_is_an_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 9, 1, 2]).await.unwrap();
        drop(client);

        let result: Result<Option<MulResponse>, Error> = read_frame(&mut server).await;
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
