//! Pipes, sockets, event descriptors and readiness polling

use crate::fixtures::Fixtures;
use crate::probe::{check, Invocation, Probe, ProbeClass, ProbeResult};
use crate::probes::owned_fd;
use nix::errno::Errno;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

pub const PROBES: &[Probe] = &[
    Probe::new("pipe2", ProbeClass::Ipc, pipe2),
    Probe::new("socketpair", ProbeClass::Ipc, socketpair),
    Probe::new("socket", ProbeClass::Ipc, socket),
    Probe::new("sendto", ProbeClass::Ipc, sendto),
    Probe::new("recvfrom", ProbeClass::Ipc, recvfrom),
    Probe::new("getsockopt", ProbeClass::Ipc, getsockopt),
    Probe::new("eventfd2", ProbeClass::Ipc, eventfd2),
    Probe::new("poll", ProbeClass::Ipc, poll),
    Probe::new("select", ProbeClass::Ipc, select),
    Probe::new("epoll_create1", ProbeClass::Ipc, epoll_create1),
    Probe::new("epoll_ctl", ProbeClass::Ipc, epoll_ctl),
    Probe::new("epoll_wait", ProbeClass::Ipc, epoll_wait),
    Probe::new("futex", ProbeClass::Ipc, futex),
];

const MSG: &[u8] = b"sysrank";

fn pair() -> Result<(OwnedFd, OwnedFd), Errno> {
    let mut fds = [-1; 2];
    check(unsafe {
        libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_STREAM | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            0,
            fds.as_mut_ptr(),
        )
    })?;
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

fn eventfd() -> Result<OwnedFd, Errno> {
    owned_fd(unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) })
}

fn pipe2(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut fds = [-1; 2];
    let ret = inv.timed(|| unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) });
    check(ret)?;
    drop(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) });
    Ok(())
}

fn socketpair(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let mut fds = [-1; 2];
    let ret = inv.timed(|| unsafe {
        libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0, fds.as_mut_ptr())
    });
    check(ret)?;
    drop(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) });
    Ok(())
}

fn socket(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe {
        libc::socket(libc::AF_UNIX, libc::SOCK_DGRAM | libc::SOCK_CLOEXEC, 0)
    });
    owned_fd(fd).map(drop)
}

fn sendto(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let (tx, _rx) = pair()?;
    check(inv.timed(|| unsafe {
        libc::sendto(
            tx.as_raw_fd(),
            MSG.as_ptr() as *const libc::c_void,
            MSG.len(),
            0,
            std::ptr::null(),
            0,
        )
    }))
}

fn recvfrom(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let (tx, rx) = pair()?;
    check(unsafe { libc::send(tx.as_raw_fd(), MSG.as_ptr() as *const libc::c_void, MSG.len(), 0) })?;
    let mut buf = [0u8; 16];
    check(inv.timed(|| unsafe {
        libc::recvfrom(
            rx.as_raw_fd(),
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    }))
}

fn getsockopt(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let (sock, _peer) = pair()?;
    let mut value: libc::c_int = 0;
    let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
    check(inv.timed(|| unsafe {
        libc::getsockopt(
            sock.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_TYPE,
            &mut value as *mut libc::c_int as *mut libc::c_void,
            &mut len,
        )
    }))
}

fn eventfd2(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) });
    owned_fd(fd).map(drop)
}

fn poll(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let efd = eventfd()?;
    let mut pfd = libc::pollfd {
        fd: efd.as_raw_fd(),
        events: libc::POLLIN | libc::POLLOUT,
        revents: 0,
    };
    check(inv.timed(|| unsafe { libc::poll(&mut pfd, 1, 0) }))
}

fn select(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let efd = eventfd()?;
    let fd = efd.as_raw_fd();
    if fd >= libc::FD_SETSIZE as libc::c_int {
        return Err(Errno::EBADF);
    }
    let mut readfds = unsafe {
        let mut set = std::mem::MaybeUninit::<libc::fd_set>::uninit();
        libc::FD_ZERO(set.as_mut_ptr());
        set.assume_init()
    };
    unsafe { libc::FD_SET(fd, &mut readfds) };
    let mut timeout = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    check(inv.timed(|| unsafe {
        libc::select(
            fd + 1,
            &mut readfds,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            &mut timeout,
        )
    }))
}

fn epoll_create1(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let fd = inv.timed(|| unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) });
    owned_fd(fd).map(drop)
}

fn epoll_ctl(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let epfd = owned_fd(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
    let efd = eventfd()?;
    let mut event = libc::epoll_event {
        events: libc::EPOLLIN as u32,
        u64: 0,
    };
    check(inv.timed(|| unsafe {
        libc::epoll_ctl(epfd.as_raw_fd(), libc::EPOLL_CTL_ADD, efd.as_raw_fd(), &mut event)
    }))
}

fn epoll_wait(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let epfd = owned_fd(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
    let efd = eventfd()?;
    let mut event = libc::epoll_event {
        events: libc::EPOLLOUT as u32,
        u64: 0,
    };
    check(unsafe {
        libc::epoll_ctl(epfd.as_raw_fd(), libc::EPOLL_CTL_ADD, efd.as_raw_fd(), &mut event)
    })?;
    let mut ready = [libc::epoll_event { events: 0, u64: 0 }; 1];
    check(inv.timed(|| unsafe {
        libc::epoll_wait(epfd.as_raw_fd(), ready.as_mut_ptr(), ready.len() as libc::c_int, 0)
    }))
}

// Wake with no waiters: the cheapest complete trip through the futex code
fn futex(_: &Fixtures, inv: &mut Invocation) -> ProbeResult {
    let word: u32 = 0;
    check(inv.timed(|| unsafe {
        libc::syscall(
            libc::SYS_futex,
            &word as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            1 as libc::c_int,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0 as libc::c_int,
        )
    }))
}
