/*
 * fakeid: ownership and permission emulation for ptrace-based fake root
 * Copyright (C) 2024 The fakeid Authors
 *
 * This program is free software: you can redistribute it and/or modify it
 * under the terms of the GNU Lesser General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or (at your
 * option) any later version.
 *
 * This program is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
 * or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License
 * for more details.
 *
 * You should have received a copy of the GNU Lesser General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

// memory_store! {
//     "/etc" => dir (0o755, 0:0),
//     "/etc/passwd" => file (0o644, 0:0),
// }
macro_rules! memory_store {
    (@mode dir $mode:literal) => { ::libc::S_IFDIR | $mode };
    (@mode file $mode:literal) => { ::libc::S_IFREG | $mode };

    ($($path:literal => $kind:ident ($mode:literal, $owner:literal : $group:literal)),* $(,)?) => {{
        let store = $crate::MemoryStore::new();
        $(
            store.insert(
                &$crate::GuestPath::new($path)?,
                $crate::Record::new(
                    $crate::tests::common::memory_store!(@mode $kind $mode),
                    $owner,
                    $group,
                ),
            )?;
        )*
        store
    }};
}
pub(crate) use memory_store;

/// Wrap a `MemoryStore` and a `MockTranslator` in an `Emulator`.
macro_rules! emulator {
    ($config:expr, $store:expr) => {
        $crate::tests::common::emulator!(
            $config,
            $store,
            $crate::tests::common::MockTranslator::new()
        )
    };
    ($config:expr, $store:expr, $translator:expr) => {
        $crate::Emulator::new($config, $store, $translator)
    };
}
pub(crate) use emulator;
