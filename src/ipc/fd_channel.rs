// Copyright 2022 Ryan Seipp
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! File-descriptor passing between the master and a worker, over an `AF_UNIX`
//! `SOCK_DGRAM` socket pair created before `fork`, using `SCM_RIGHTS` ancillary data.

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use nix::sys::socket::{
    self, recvmsg, sendmsg, AddressFamily, ControlMessage, ControlMessageOwned, MsgFlags,
    SockFlag, SockType,
};

use crate::error::{Result, ServerError};

/// One end of a master-worker descriptor-passing channel.
#[derive(Debug)]
pub struct ChannelEnd {
    fd: OwnedFd,
}

/// Creates a connected pair of channel ends. Must be called before `fork`, so that both
/// the parent and the forthcoming child inherit one end each.
pub fn channel_pair() -> Result<(ChannelEnd, ChannelEnd)> {
    let (a, b) = socket::socketpair(
        AddressFamily::Unix,
        SockType::Datagram,
        None,
        SockFlag::empty(),
    )
    .map_err(ServerError::Channel)?;
    Ok((ChannelEnd { fd: a }, ChannelEnd { fd: b }))
}

impl ChannelEnd {
    /// Sends `fd` to the peer along with a one-byte filler payload.
    ///
    /// The caller retains ownership of `fd`; closing the local copy afterward (the master's
    /// responsibility once this returns) is on the caller.
    pub fn send_fd(&self, fd: RawFd) -> Result<()> {
        let iov = [IoSlice::new(b"F")];
        let cmsg = [ControlMessage::ScmRights(&[fd])];
        sendmsg::<()>(self.fd.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)
            .map_err(ServerError::Channel)?;
        Ok(())
    }

    /// Receives one descriptor sent via [`send_fd`](Self::send_fd).
    ///
    /// Returns [`ServerError::ChannelClosed`] when the peer has closed its end (a zero-length
    /// datagram), which the caller should treat as "the master is gone" rather than retry.
    pub fn recv_fd(&self) -> Result<RawFd> {
        let mut filler = [0u8; 1];
        let mut iov = [IoSliceMut::new(&mut filler)];
        let mut cmsg_space = nix::cmsg_space!([RawFd; 1]);

        let msg = recvmsg::<()>(
            self.fd.as_raw_fd(),
            &mut iov,
            Some(&mut cmsg_space),
            MsgFlags::empty(),
        )
        .map_err(ServerError::Channel)?;

        if msg.bytes == 0 {
            return Err(ServerError::ChannelClosed);
        }

        for cmsg in msg.cmsgs() {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                if let Some(&fd) = fds.first() {
                    return Ok(fd);
                }
            }
        }

        Err(ServerError::ChannelClosed)
    }

    /// Wraps a received descriptor into a `TcpStream`.
    ///
    /// # Safety
    /// `fd` must be a descriptor this process exclusively owns, such as one just returned
    /// by [`recv_fd`](Self::recv_fd), and must refer to a connected TCP socket.
    pub unsafe fn fd_into_tcp_stream(fd: RawFd) -> std::net::TcpStream {
        std::net::TcpStream::from_raw_fd(fd)
    }
}

impl AsRawFd for ChannelEnd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}
