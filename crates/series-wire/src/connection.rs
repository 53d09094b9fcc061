//! A single pooled connection to one cluster member, speaking raw RESP
//! over TCP. Mirrors the lazy-dial-then-reuse discipline of
//! `gazette::dial_channel`, but for a plain TCP socket rather than a gRPC
//! transport `Channel`.

use crate::command::{Command, Reply};
use crate::Error;
use std::future::Future;
use std::pin::Pin;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;

pub struct Connection {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

impl Connection {
    pub async fn dial(addr: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(Error::Connect)?;
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    /// Write `cmd` and read back exactly one reply.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn request(&mut self, cmd: &Command) -> Result<Reply, Error> {
        self.writer
            .write_all(cmd.bytes())
            .await
            .map_err(Error::Connect)?;
        self.writer.flush().await.map_err(Error::Connect)?;
        self.read_reply().await
    }

    // Boxed to allow the array-reply branch to recurse: an `async fn`
    // calling itself produces an infinitely-sized future type otherwise.
    fn read_reply(&mut self) -> Pin<Box<dyn Future<Output = Result<Reply, Error>> + Send + '_>> {
        Box::pin(async move {
            let line = self.read_line().await?;
            let (tag, rest) = line.split_at(1);

            match tag.as_bytes()[0] {
                b'+' => Ok(Reply::Simple(rest.to_string())),
                b'-' => Ok(Reply::Error(rest.to_string())),
                b':' => rest
                    .parse()
                    .map(Reply::Integer)
                    .map_err(|_| Error::Protocol("malformed integer reply")),
                b'$' => {
                    let len: i64 = rest
                        .parse()
                        .map_err(|_| Error::Protocol("malformed bulk length"))?;
                    if len < 0 {
                        return Ok(Reply::Nil);
                    }
                    let mut buf = vec![0u8; len as usize];
                    self.reader
                        .read_exact(&mut buf)
                        .await
                        .map_err(Error::Connect)?;
                    self.consume_crlf().await?;
                    Ok(Reply::Bulk(buf))
                }
                b'*' => {
                    let len: i64 = rest
                        .parse()
                        .map_err(|_| Error::Protocol("malformed array length"))?;
                    if len < 0 {
                        return Ok(Reply::Nil);
                    }
                    let mut items = Vec::with_capacity(len as usize);
                    for _ in 0..len {
                        items.push(self.read_reply().await?);
                    }
                    Ok(Reply::Array(items))
                }
                _ => Err(Error::Protocol("unrecognized RESP type tag")),
            }
        })
    }

    async fn read_line(&mut self) -> Result<String, Error> {
        let mut line = Vec::new();
        loop {
            let byte = self.reader.read_u8().await.map_err(Error::Connect)?;
            if byte == b'\r' {
                let lf = self.reader.read_u8().await.map_err(Error::Connect)?;
                if lf != b'\n' {
                    return Err(Error::Protocol("expected CRLF line terminator"));
                }
                break;
            }
            line.push(byte);
        }
        String::from_utf8(line).map_err(|_| Error::Protocol("non-UTF-8 line"))
    }

    async fn consume_crlf(&mut self) -> Result<(), Error> {
        let mut crlf = [0u8; 2];
        self.reader
            .read_exact(&mut crlf)
            .await
            .map_err(Error::Connect)?;
        if &crlf != b"\r\n" {
            return Err(Error::Protocol("expected trailing CRLF after bulk"));
        }
        Ok(())
    }
}
