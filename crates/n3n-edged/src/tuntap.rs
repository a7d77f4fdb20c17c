// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linux `/dev/net/tun` backing for [`n3n_edge::tap::Tap`].
//!
//! The core crate keeps TAP bring-up out of scope and talks only to the
//! `Tap` trait; this is the one concrete implementation the daemon needs to
//! actually run, the same role `tuntap_linux.c`'s `tuntap_open` plays for
//! `example_edge_embed.c`.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};

use n3n_edge::mac::Mac;
use n3n_edge::tap::Tap;

const IFF_TAP: libc::c_short = 0x0002;
const IFF_NO_PI: libc::c_short = 0x1000;
// _IOW('T', 202, int), fixed on Linux regardless of kernel version.
const TUNSETIFF: libc::c_ulong = 0x4004_54ca;

#[repr(C)]
struct IfReq {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_flags: libc::c_short,
    _padding: [u8; 22],
}

/// An open Linux TAP device, set non-blocking so [`Tap::read_frame`] never
/// stalls the reactor waiting for the next frame.
pub struct LinuxTap {
    file: File,
    mac: Mac,
}

impl LinuxTap {
    pub fn open(name: &str, mac: Mac) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open("/dev/net/tun")?;

        let mut ifr: IfReq = unsafe { std::mem::zeroed() };
        let name_c = CString::new(name).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "bad interface name"))?;
        for (dst, src) in ifr.ifr_name.iter_mut().zip(name_c.as_bytes_with_nul()) {
            *dst = *src as libc::c_char;
        }
        ifr.ifr_flags = IFF_TAP | IFF_NO_PI;

        let rc = unsafe { libc::ioctl(file.as_raw_fd(), TUNSETIFF, &mut ifr) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        let flags = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_GETFL) };
        if flags >= 0 {
            unsafe {
                libc::fcntl(file.as_raw_fd(), libc::F_SETFL, flags | libc::O_NONBLOCK);
            }
        }

        Ok(Self { file, mac })
    }
}

impl Tap for LinuxTap {
    fn read_frame(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.raw_os_error() == Some(libc::EAGAIN) => {
                Err(io::Error::new(io::ErrorKind::WouldBlock, err))
            }
            Err(err) => Err(err),
        }
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.file.write_all(frame)
    }

    fn mac(&self) -> Mac {
        self.mac
    }

    fn as_raw_fd_like(&self) -> RawFd {
        self.file.as_raw_fd()
    }
}
