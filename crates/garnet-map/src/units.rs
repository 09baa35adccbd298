macro_rules! def_units {
    ($t: ident, $doc: expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $t<T>(pub T);

        impl<T> $t<T> {
            pub fn into_inner(self) -> T {
                self.0
            }

            pub fn map<S>(self, mut f: impl FnMut(T) -> S) -> $t<S> {
                $t(f(self.0))
            }
        }
    };
}

def_units!(VoxelUnits, "Denotes that the inner `T` is given in units of voxels.");
def_units!(ChunkUnits, "Denotes that the inner `T` is given in units of chunks.");
