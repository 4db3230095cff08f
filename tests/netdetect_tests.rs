use lan_print_bridge::netdetect::ipv4_to_default_cidr;
use lan_print_bridge::traits::{NetPath, NetworkPaths};
use std::net::Ipv4Addr;

#[test]
fn default_cidr_is_24() {
    let cidr = ipv4_to_default_cidr(Ipv4Addr::new(192, 168, 42, 99));
    assert_eq!(cidr.to_string(), "192.168.42.0/24");
}

struct Paths {
    wired: Option<Ipv4Addr>,
    wireless: Option<Ipv4Addr>,
}

impl NetworkPaths for Paths {
    fn is_up(&self, path: NetPath) -> bool {
        self.local_address(path).is_some()
    }

    fn local_address(&self, path: NetPath) -> Option<Ipv4Addr> {
        match path {
            NetPath::Wired => self.wired,
            NetPath::Wireless => self.wireless,
        }
    }
}

#[test]
fn wired_path_wins_when_both_are_up() {
    let both = Paths {
        wired: Some(Ipv4Addr::new(10, 0, 0, 2)),
        wireless: Some(Ipv4Addr::new(192, 168, 4, 2)),
    };
    assert_eq!(both.current_address(), Some(Ipv4Addr::new(10, 0, 0, 2)));

    let wifi_only = Paths {
        wired: None,
        wireless: Some(Ipv4Addr::new(192, 168, 4, 2)),
    };
    assert_eq!(wifi_only.current_address(), Some(Ipv4Addr::new(192, 168, 4, 2)));

    let none = Paths {
        wired: None,
        wireless: None,
    };
    assert_eq!(none.current_address(), None);
}
