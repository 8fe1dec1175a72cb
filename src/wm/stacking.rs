//! Stacking Module
//!
//! Computes the z-order of managed windows. Clients are ordered by layer
//! and, within a layer, by how recently they were focused. Icons and the
//! move/resize placeholder always sit above every client.

use x11rb::protocol::xproto::Window;

use crate::wm::client::Client;

/// Bottom-to-top stacking order of `clients`, followed by `overlays`
pub fn stacking_order<'a>(
    clients: impl IntoIterator<Item = &'a Client>,
    overlays: impl IntoIterator<Item = Window>,
) -> Vec<Window> {
    let mut ordered: Vec<&Client> = clients.into_iter().collect();
    ordered.sort_by_key(|c| (c.layer, c.raise_serial, c.window));

    ordered
        .into_iter()
        .map(|c| c.window)
        .chain(overlays)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Geometry;
    use crate::wm::client::{Desktop, Layer};

    fn client(window: Window, layer: u8, raise_serial: u64) -> Client {
        let mut client = Client::new(window, Desktop::Numbered(1), Geometry::default(), true);
        client.layer = Layer::new(layer).expect("valid layer");
        client.raise_serial = raise_serial;
        client
    }

    #[test]
    fn test_layers_then_raise_order() {
        let clients = vec![
            client(1, 5, 3),
            client(2, 9, 0),
            client(3, 5, 1),
            client(4, 1, 7),
        ];
        assert_eq!(stacking_order(&clients, []), vec![4, 3, 1, 2]);
    }

    #[test]
    fn test_overlays_on_top() {
        let clients = vec![client(1, 10, 0), client(2, 1, 0)];
        assert_eq!(stacking_order(&clients, [100, 101]), vec![2, 1, 100, 101]);
    }
}
